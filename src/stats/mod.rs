//! Verification counters.
//!
//! Tag mismatches, timeouts, and dropped messages are silent at the
//! protocol level; these counters are how they stay visible. Counters are
//! monotonic and shared read-only with the embedding stack.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for signing and verification outcomes.
#[derive(Debug, Default)]
pub struct SigningStats {
    verified: AtomicU64,
    tag_mismatch: AtomicU64,
    tag_length_rejected: AtomicU64,
    whitelist_miss: AtomicU64,
    timed_out: AtomicU64,
    unexpected_replies: AtomicU64,
    superseded: AtomicU64,
    evicted: AtomicU64,
    dropped_unsigned: AtomicU64,
}

impl SigningStats {
    pub fn verified(&self) -> u64 {
        self.verified.load(Ordering::Relaxed)
    }

    pub fn tag_mismatch(&self) -> u64 {
        self.tag_mismatch.load(Ordering::Relaxed)
    }

    pub fn tag_length_rejected(&self) -> u64 {
        self.tag_length_rejected.load(Ordering::Relaxed)
    }

    pub fn whitelist_miss(&self) -> u64 {
        self.whitelist_miss.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn unexpected_replies(&self) -> u64 {
        self.unexpected_replies.load(Ordering::Relaxed)
    }

    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn dropped_unsigned(&self) -> u64 {
        self.dropped_unsigned.load(Ordering::Relaxed)
    }

    /// Total failed verifications, across all failure reasons.
    pub fn failed(&self) -> u64 {
        self.tag_mismatch() + self.tag_length_rejected() + self.whitelist_miss()
    }

    pub(crate) fn record_verified(&self) {
        self.verified.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tag_mismatch(&self) {
        self.tag_mismatch.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tag_length_rejected(&self) {
        self.tag_length_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_whitelist_miss(&self) {
        self.whitelist_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unexpected_reply(&self) {
        self.unexpected_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_unsigned(&self) {
        self.dropped_unsigned.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = SigningStats::default();
        assert_eq!(stats.verified(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(stats.timed_out(), 0);
    }

    #[test]
    fn test_failed_aggregates_reasons() {
        let stats = SigningStats::default();
        stats.record_tag_mismatch();
        stats.record_tag_length_rejected();
        stats.record_whitelist_miss();
        stats.record_verified();
        assert_eq!(stats.failed(), 3);
        assert_eq!(stats.verified(), 1);
    }
}
