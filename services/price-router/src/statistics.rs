//! Per-stream running statistics
//!
//! Tracks min/max, last observation and cumulative absolute fluctuation for
//! every stream that has delivered at least one tick. Every tick is recorded,
//! including ticks with out-of-order timestamps.
//!
//! The fluctuation sum saturates at `Decimal::MAX` rather than overflowing.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::StreamId;
use types::numeric::Price;

/// Point-in-time statistics for one stream.
///
/// The default value is the zeroed snapshot returned for unknown streams.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockStatistics {
    pub last_price: Price,
    /// Unix nanos of the last recorded tick (0 if none).
    pub last_observed_at: i64,
    pub min_price: Price,
    pub max_price: Price,
    /// Sum of |p[i] - p[i-1]| over consecutive recorded prices.
    pub cumulative_fluctuation: Decimal,
    /// Number of ticks recorded; zero means no data.
    pub tick_count: u64,
}

impl StockStatistics {
    fn first(price: Price, observed_at: i64) -> Self {
        Self {
            last_price: price,
            last_observed_at: observed_at,
            min_price: price,
            max_price: price,
            cumulative_fluctuation: Decimal::ZERO,
            tick_count: 1,
        }
    }

    /// Returns true if the move could not be added to the fluctuation sum.
    fn apply(&mut self, price: Price, observed_at: i64) -> bool {
        let total = price
            .checked_abs_diff(self.last_price)
            .and_then(|step| self.cumulative_fluctuation.checked_add(step));
        let saturated = total.is_none();
        self.cumulative_fluctuation = total.unwrap_or(Decimal::MAX);
        self.min_price = self.min_price.min(price);
        self.max_price = self.max_price.max(price);
        self.last_price = price;
        self.last_observed_at = observed_at;
        self.tick_count += 1;
        saturated
    }

    pub fn has_data(&self) -> bool {
        self.tick_count > 0
    }
}

/// Concurrent statistics store keyed by stream.
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    stats: DashMap<StreamId, StockStatistics>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation for a stream.
    ///
    /// Returns true when the cumulative fluctuation saturated on this tick.
    pub fn record(&self, stream_id: &StreamId, price: Price, observed_at: i64) -> bool {
        if let Some(mut entry) = self.stats.get_mut(stream_id) {
            return entry.apply(price, observed_at);
        }
        match self.stats.entry(stream_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().apply(price, observed_at),
            Entry::Vacant(entry) => {
                entry.insert(StockStatistics::first(price, observed_at));
                false
            }
        }
    }

    /// Snapshot for a stream; zeroed if the stream never delivered a tick.
    pub fn read(&self, stream_id: &StreamId) -> StockStatistics {
        self.stats
            .get(stream_id)
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Snapshot of every known stream, ordered by stream id.
    pub fn snapshot_all(&self) -> BTreeMap<StreamId, StockStatistics> {
        self.stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Number of streams with recorded data.
    pub fn stream_count(&self) -> usize {
        self.stats.len()
    }
}
