#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<rig_config::Config>(data) {
        if cfg.validate().is_ok() {
            // A config that validates must also convert
            let _ = rig_core::BenchSettings::try_from(&cfg)
                .expect("validated config converts");
        }
    }
});
