use std::time::{Duration, Instant};

/// Format a `Duration` with automatic unit scaling (`1.94ms`, `2.34s`).
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Warn when `operation` has been running longer than `threshold`.
///
/// Returns whether the warning fired.
pub fn log_if_slow(start: Instant, threshold: Duration, operation: &str) -> bool {
    let elapsed = start.elapsed();
    let slow = elapsed > threshold;
    if slow {
        tracing::warn!(
            operation,
            duration = fmt_duration(elapsed),
            threshold = fmt_duration(threshold),
            "slow operation"
        );
    }
    slow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_two_decimals() {
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(fmt_duration(Duration::from_micros(250)), "250.00µs");
    }

    #[test]
    fn fast_operations_are_not_reported() {
        assert!(!log_if_slow(Instant::now(), Duration::from_secs(60), "noop"));
    }
}
