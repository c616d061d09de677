//! Outbound event definitions for the price router
//!
//! `PublishedPrice` is the only event crossing the subscriber boundary. Each
//! carries a UUID v7 so downstream consumers can order and dedupe them.

use serde::{Deserialize, Serialize};
use types::ids::{InstrumentId, StreamId};
use types::numeric::Price;
use uuid::Uuid;

use crate::failover::FailoverDecision;

/// Why a price was published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PublishReason {
    /// Regular tick on the active stream
    Tick,
    /// Last known price of a newly activated stream
    Failover,
}

/// A price admitted for publication to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPrice {
    /// Unique event identifier (UUID v7)
    pub event_id: Uuid,
    /// Stream the price was observed on
    pub stream_id: StreamId,
    pub instrument: InstrumentId,
    pub price: Price,
    /// Unix nanoseconds timestamp of the observation
    pub observed_at: i64,
    pub reason: PublishReason,
}

impl PublishedPrice {
    pub fn new(
        stream_id: StreamId,
        instrument: InstrumentId,
        price: Price,
        observed_at: i64,
        reason: PublishReason,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            stream_id,
            instrument,
            price,
            observed_at,
            reason,
        }
    }
}

/// Result of processing one tick through the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// False when the tick was discarded (unknown stream).
    pub recorded: bool,
    /// Failover evaluation; `NotActive` for standby streams and discarded ticks.
    pub decision: FailoverDecision,
    /// Prices forwarded to subscribers, in publication order.
    pub published: Vec<PublishedPrice>,
}

impl TickOutcome {
    pub fn discarded() -> Self {
        Self {
            recorded: false,
            decision: FailoverDecision::NotActive,
            published: Vec::new(),
        }
    }
}
