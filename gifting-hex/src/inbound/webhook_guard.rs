//! Accounting of rejected gateway callback signatures.
//!
//! Every rejection is a security event. Once a source keeps failing past the
//! threshold the log level escalates so alerting can pick it up.

use dashmap::DashMap;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_SOURCES: usize = 1024;

/// Bucket shared by every source seen after the map is full.
pub const OVERFLOW_SOURCE: &str = "overflow";

/// Consecutive signature failures per callback source.
///
/// The source is client-supplied, so the number of tracked sources is capped.
pub struct SignatureFailureTracker {
    failures: DashMap<String, u32>,
    threshold: u32,
    max_sources: usize,
}

impl Default for SignatureFailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl SignatureFailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self::with_capacity(threshold, DEFAULT_MAX_SOURCES)
    }

    pub fn with_capacity(threshold: u32, max_sources: usize) -> Self {
        Self {
            failures: DashMap::new(),
            threshold,
            max_sources: max_sources.max(1),
        }
    }

    /// Counts a failure and returns the source's running total.
    pub fn record_failure(&self, source: &str) -> u32 {
        let known = self.failures.contains_key(source);
        let source = if known || self.failures.len() < self.max_sources {
            source
        } else {
            OVERFLOW_SOURCE
        };

        let count = {
            let mut entry = self.failures.entry(source.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        if count > self.threshold {
            tracing::error!(
                source,
                failures = count,
                threshold = self.threshold,
                "Repeated invalid gateway callback signatures"
            );
        } else {
            tracing::warn!(source, failures = count, "Invalid gateway callback signature");
        }

        count
    }

    /// Forgets a source after it delivered a valid callback.
    pub fn clear(&self, source: &str) {
        self.failures.remove(source);
    }

    pub fn failures(&self, source: &str) -> u32 {
        self.failures.get(source).map(|c| *c).unwrap_or(0)
    }

    pub fn tracked_sources(&self) -> usize {
        self.failures.len()
    }
}
