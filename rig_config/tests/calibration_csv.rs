use std::fs::File;
use std::io::Write;

use rig_config::{CalibrationRow, LoadCellCalibration, load_calibration_csv};
use rstest::rstest;
use tempfile::tempdir;

fn row(raw: i64, force: f32) -> CalibrationRow {
    CalibrationRow { raw, force }
}

#[rstest]
fn two_point_fit_gives_tare_and_scale() {
    // force = (raw - 100) / 2
    let c = LoadCellCalibration::from_rows(&[row(100, 0.0), row(300, 100.0)]).unwrap();
    assert_eq!(c.tare_counts, 100);
    assert!((c.counts_per_unit - 2.0).abs() < 1e-6);
}

#[rstest]
fn decreasing_raw_gives_negative_scale() {
    // Compression-mounted cell: counts fall as force rises
    let c = LoadCellCalibration::from_rows(&[
        row(1_000, 0.0),
        row(750, 1.0),
        row(500, 2.0),
    ])
    .unwrap();
    assert_eq!(c.tare_counts, 1_000);
    assert!((c.counts_per_unit + 250.0).abs() < 1e-3);
}

#[rstest]
#[case(vec![row(100, 0.0)], "at least two rows")]
#[case(vec![row(100, 0.0), row(100, 10.0)], "duplicate raw")]
#[case(vec![row(100, 0.0), row(200, 100.0), row(150, 70.0)], "monotonic")]
#[case(vec![row(100, 5.0), row(200, 5.0)], "zero or non-finite slope")]
fn rejects_degenerate_rows(#[case] rows: Vec<CalibrationRow>, #[case] needle: &str) {
    let err = LoadCellCalibration::from_rows(&rows).expect_err("should fail");
    assert!(
        err.to_string().contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[rstest]
fn csv_loader_reads_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "raw,force").unwrap();
    writeln!(f, "842913, 0.0").unwrap();
    writeln!(f, "593891, 1000.0").unwrap();
    drop(f);

    let c = load_calibration_csv(&path).unwrap();
    assert_eq!(c.tare_counts, 842_913);
    assert!((c.counts_per_unit + 249.022).abs() < 1e-2);
}

#[rstest]
fn csv_loader_enforces_headers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    std::fs::write(&path, "raw,grams\n1,0\n2,1\n").unwrap();
    let err = load_calibration_csv(&path).expect_err("wrong headers");
    assert!(err.to_string().contains("headers 'raw,force'"));
}

#[rstest]
fn csv_loader_reports_bad_row_number() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.csv");
    std::fs::write(&path, "raw,force\n1,0\nabc,1\n").unwrap();
    let err = load_calibration_csv(&path).expect_err("bad row");
    assert!(err.to_string().contains("invalid CSV row 3"), "{err}");
}
