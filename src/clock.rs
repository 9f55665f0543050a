//! Wall-clock time in seconds
//!
//! Event timestamps, parser timestamps and output due times all use this
//! clock, so they can be compared directly within one run.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = now();
        let b = now();
        assert!(a > 0.0);
        assert!(b >= a);
    }
}
