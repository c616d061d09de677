//! Observability counters for the price router
//!
//! Tracks tick throughput, publication decisions, failovers and degraded
//! evaluations, plus per-tick processing latency. Exported as a flat map
//! for Prometheus-style exposition by the host.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::publication::Admission;

/// Core metrics for the price router.
pub struct IngestMetrics {
    // Ticks
    pub ticks_received: AtomicU64,
    pub ticks_discarded: AtomicU64,
    pub ticks_recorded: AtomicU64,
    pub tick_processing_ns: LatencyHistogram,
    pub fluctuation_saturated: AtomicU64,

    // Publication
    pub prices_published: AtomicU64,
    pub forced_published: AtomicU64,
    pub suppressed_unchanged: AtomicU64,
    pub suppressed_too_soon: AtomicU64,

    // Failover
    pub failovers: AtomicU64,
    pub degraded_evaluations: AtomicU64,
    pub divergence_checks_skipped: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self {
            ticks_received: AtomicU64::new(0),
            ticks_discarded: AtomicU64::new(0),
            ticks_recorded: AtomicU64::new(0),
            tick_processing_ns: LatencyHistogram::new(),
            fluctuation_saturated: AtomicU64::new(0),
            prices_published: AtomicU64::new(0),
            forced_published: AtomicU64::new(0),
            suppressed_unchanged: AtomicU64::new(0),
            suppressed_too_soon: AtomicU64::new(0),
            failovers: AtomicU64::new(0),
            degraded_evaluations: AtomicU64::new(0),
            divergence_checks_skipped: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.ticks_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a tick applied to state and statistics.
    pub fn record_recorded(&self, latency_ns: u64) {
        self.ticks_recorded.fetch_add(1, Ordering::Relaxed);
        self.tick_processing_ns.record(latency_ns);
    }

    /// Record the outcome of an admission check.
    pub fn record_admission(&self, admission: Admission, forced: bool) {
        match admission {
            Admission::Admitted if forced => {
                self.prices_published.fetch_add(1, Ordering::Relaxed);
                self.forced_published.fetch_add(1, Ordering::Relaxed);
            }
            Admission::Admitted => {
                self.prices_published.fetch_add(1, Ordering::Relaxed);
            }
            Admission::Unchanged => {
                self.suppressed_unchanged.fetch_add(1, Ordering::Relaxed);
            }
            Admission::TooSoon => {
                self.suppressed_too_soon.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_failover(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_evaluations.fetch_add(1, Ordering::Relaxed);
    }

    /// A stream's fluctuation sum hit `Decimal::MAX`.
    pub fn record_fluctuation_saturated(&self) {
        self.fluctuation_saturated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_divergence_skipped(&self) {
        self.divergence_checks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// p99 tick processing latency, if any samples exist.
    pub fn tick_processing_p99_ns(&self) -> Option<u64> {
        self.tick_processing_ns.percentile(99)
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("ticks_received".to_string(), self.ticks_received.load(Ordering::Relaxed));
        m.insert("ticks_discarded".to_string(), self.ticks_discarded.load(Ordering::Relaxed));
        m.insert("ticks_recorded".to_string(), self.ticks_recorded.load(Ordering::Relaxed));
        m.insert("prices_published".to_string(), self.prices_published.load(Ordering::Relaxed));
        m.insert("forced_published".to_string(), self.forced_published.load(Ordering::Relaxed));
        m.insert("suppressed_unchanged".to_string(), self.suppressed_unchanged.load(Ordering::Relaxed));
        m.insert("suppressed_too_soon".to_string(), self.suppressed_too_soon.load(Ordering::Relaxed));
        m.insert(
            "fluctuation_saturated".to_string(),
            self.fluctuation_saturated.load(Ordering::Relaxed),
        );
        m.insert("failovers".to_string(), self.failovers.load(Ordering::Relaxed));
        m.insert("degraded_evaluations".to_string(), self.degraded_evaluations.load(Ordering::Relaxed));
        m.insert(
            "divergence_checks_skipped".to_string(),
            self.divergence_checks_skipped.load(Ordering::Relaxed),
        );
        m
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Upper bounds (inclusive, nanoseconds) of the latency buckets.
const LATENCY_BOUNDS_NS: [u64; 12] = [
    1_000,
    2_500,
    5_000,
    10_000,
    25_000,
    50_000,
    100_000,
    250_000,
    500_000,
    1_000_000,
    5_000_000,
    u64::MAX,
];

/// Fixed-bucket latency histogram updated with atomics only.
///
/// Percentiles resolve to the bucket's upper bound, capped by the largest
/// sample seen.
pub struct LatencyHistogram {
    buckets: [AtomicU64; LATENCY_BOUNDS_NS.len()],
    max_ns: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            max_ns: AtomicU64::new(0),
        }
    }

    pub fn record(&self, value_ns: u64) {
        let idx = LATENCY_BOUNDS_NS
            .iter()
            .position(|bound| value_ns <= *bound)
            .unwrap_or(LATENCY_BOUNDS_NS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.max_ns.fetch_max(value_ns, Ordering::Relaxed);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: u64) -> Option<u64> {
        let counts: Vec<u64> = self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return None;
        }

        let rank = (total * p.min(100)).div_ceil(100).max(1);
        let mut seen = 0;
        for (count, bound) in counts.iter().zip(LATENCY_BOUNDS_NS) {
            seen += count;
            if seen >= rank {
                return Some(bound.min(self.max_ns.load(Ordering::Relaxed)));
            }
        }
        Some(self.max_ns.load(Ordering::Relaxed))
    }

    pub fn count(&self) -> u64 {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}
