use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as whole seconds since the epoch, used for
/// session timestamps and `Data` receive-time stamping (the Rust
/// equivalent of the original's `time(NULL)` calls).
pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
