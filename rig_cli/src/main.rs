mod backend;
mod cli;
mod error_fmt;
mod tcp;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use rig_core::{BenchSettings, Benchmark, Runner};
use rig_traits::{ForceSensor, MonotonicClock, PowerSensor};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            serve(&cfg, &bind, cli.json)
        }
        Commands::SelfCheck => self_check(&cfg, cli.json),
    }
}

fn load_config(path: &Path) -> eyre::Result<rig_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config file {}", path.display()))?;
    let cfg: rig_config::Config = toml::from_str(&text)
        .wrap_err_with(|| format!("parse config file {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, logging: &rig_config::Logging) -> eyre::Result<()> {
    // RUST_LOG wins, then --log-level, then [logging].level
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .wrap_err_with(|| format!("invalid log level '{level}'"))?;

    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file '{}' has no file name", path.display()))?;
            let appender = match logging.rotation.as_deref().unwrap_or("never") {
                "daily" => tracing_appender::rolling::daily(dir, name),
                "hourly" => tracing_appender::rolling::hourly(dir, name),
                "never" => tracing_appender::rolling::never(dir, name),
                other => eyre::bail!("logging.rotation '{other}' must be never, daily or hourly"),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}

fn serve(cfg: &rig_config::Config, bind: &str, json: bool) -> eyre::Result<()> {
    let settings = BenchSettings::try_from(cfg)?;
    let (pwm, force, power) = backend::open(cfg)?;
    let mut bench = Benchmark::builder()
        .with_pwm(pwm)
        .with_force_sensor(force)
        .with_clock(MonotonicClock::new())
        .with_settings(&settings)
        .build()?;
    bench.initialize()?;

    let link = tcp::TcpLink::bind(bind).wrap_err_with(|| format!("bind {bind}"))?;
    tracing::info!(addr = %link.local_addr(), "listening for controllers");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .wrap_err("install Ctrl-C handler")?;
    }

    let mut runner = Runner::new(bench, power, link, settings.tick_period);
    let stats = runner.run(&shutdown);
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ticks": stats.ticks,
                "inbound": stats.inbound,
                "outbound": stats.outbound,
                "skipped": stats.skipped,
            })
        );
    } else {
        println!(
            "stopped after {} ticks ({} messages in, {} out)",
            stats.ticks, stats.inbound, stats.outbound
        );
    }
    Ok(())
}

fn self_check(cfg: &rig_config::Config, json: bool) -> eyre::Result<()> {
    let settings = BenchSettings::try_from(cfg)?;
    let (pwm, mut force, mut power) = backend::open(cfg)?;

    // Drives both motors to their safe state; the bench itself is discarded.
    let mut bench = Benchmark::builder()
        .with_pwm(pwm)
        .with_force_sensor(NoForce)
        .with_clock(MonotonicClock::new())
        .with_settings(&settings)
        .build()?;
    bench.initialize()?;

    let raw = power
        .read_raw()
        .map_err(|e| eyre::Report::new(rig_core::hw_error::map_boxed(&e)))
        .wrap_err("read power sensor")?;
    let sample = settings.tracker.convert(raw);

    force
        .power_up()
        .map_err(|e| eyre::Report::new(rig_core::hw_error::map_boxed(&e)))?;
    let reading = force.get_reading();
    let _ = force.power_down();
    let force_reading = reading
        .map_err(|e| eyre::Report::new(rig_core::hw_error::map_boxed(&e)))
        .wrap_err("read load cell")?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "voltage": sample.voltage,
                "current": sample.current,
                "power": sample.power(),
                "force": force_reading,
            })
        );
    } else {
        println!(
            "voltage={:.3} V current={:.3} A power={:.3} W force={:.3}",
            sample.voltage,
            sample.current,
            sample.power(),
            force_reading
        );
        println!("self-check ok");
    }
    Ok(())
}

/// Placeholder sensor so the self-check can read the real cell directly.
struct NoForce;

impl ForceSensor for NoForce {
    fn get_reading(&mut self) -> Result<f32, rig_traits::BoxError> {
        Ok(0.0)
    }

    fn power_down(&mut self) -> Result<(), rig_traits::BoxError> {
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), rig_traits::BoxError> {
        Ok(())
    }
}
