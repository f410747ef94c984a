#![no_main]
use libfuzzer_sys::fuzz_target;
use rig_core::protocol::{ControlCommand, decode};

fuzz_target!(|data: &str| {
    let Ok(req) = decode(data) else {
        return;
    };
    // A recognized command and an unrecognized one never coexist
    assert!(!(req.command.is_some() && req.unrecognized.is_some()));
    if let Some(cmd) = req.command {
        assert!(matches!(cmd, ControlCommand::Start | ControlCommand::Stop));
    }
});
