use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Block until `ready` returns true, checking every `poll_interval`.
///
/// Fails with `DataReadyTimeout` once `timeout` has passed. `ready` is always
/// evaluated at least once, so a zero timeout still succeeds on a ready line.
pub fn poll_until(
    mut ready: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if ready() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
}
