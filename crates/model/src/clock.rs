use std::time::{SystemTime, UNIX_EPOCH};

/// Server-aligned time source.
///
/// Both authorities and clients consume time through this seam. On the
/// server it is wall clock; on a client it is the offset-corrected estimate
/// maintained by the external clock reference service.
pub trait Clock {
    /// Current server time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock implementation used by the server process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis().min(i64::MAX as u128) as i64,
            Err(_) => 0,
        }
    }
}
