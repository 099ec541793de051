//! Process-wide request counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Success/failure counters for the whole process.
///
/// Constructed once at startup and shared behind an `Arc`. Observability
/// only; nothing consults these for control flow.
#[derive(Debug, Default)]
pub struct RequestCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment_independently() {
        let counters = RequestCounters::new();
        assert_eq!(counters.succeeded(), 0);
        assert_eq!(counters.failed(), 0);
        counters.record_success();
        counters.record_success();
        counters.record_failure();
        assert_eq!(counters.succeeded(), 2);
        assert_eq!(counters.failed(), 1);
    }
}
