//! Bounded polling, the only retry mechanism in the agent.

use std::time::{Duration, Instant};

/// Evaluate `predicate` until it returns true or `timeout` elapses, sleeping
/// `interval` between attempts.
///
/// The predicate always runs at least once, even with a zero timeout, and the
/// final attempt's return value is the function's result.
pub fn poll_until(mut predicate: impl FnMut() -> bool, timeout: Duration, interval: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() <= deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(interval);
    }
    predicate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_success_returns_without_sleeping() {
        let started = Instant::now();
        assert!(poll_until(|| true, Duration::from_secs(5), Duration::from_millis(100)));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn predicate_runs_at_least_once_with_zero_timeout() {
        let mut calls = 0;
        let result = poll_until(
            || {
                calls += 1;
                true
            },
            Duration::ZERO,
            Duration::from_millis(10),
        );
        assert!(result);
        assert!(calls >= 1);
    }

    #[test]
    fn final_attempt_decides_the_result() {
        // Becomes true only after the deadline; the trailing evaluation must
        // still observe it.
        let deadline_passed = Instant::now() + Duration::from_millis(30);
        let result = poll_until(
            || Instant::now() > deadline_passed,
            Duration::from_millis(30),
            Duration::from_millis(20),
        );
        assert!(result);
    }

    #[test]
    fn timeout_with_false_predicate_returns_false() {
        let mut calls = 0;
        let result = poll_until(
            || {
                calls += 1;
                false
            },
            Duration::from_millis(40),
            Duration::from_millis(10),
        );
        assert!(!result);
        assert!(calls >= 2);
    }
}
