//! Price tick as delivered by a stream
//!
//! Ticks are produced by the transport, consumed once by the router and
//! never stored.

use serde::{Deserialize, Serialize};

use crate::ids::{InstrumentId, StreamId};
use crate::numeric::Price;

/// Nanoseconds per millisecond, for converting configured durations
pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// One price observation for an instrument on a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Stream that delivered the tick
    pub stream_id: StreamId,
    /// Instrument the price refers to
    pub instrument: InstrumentId,
    /// Observed price
    pub price: Price,
    /// Unix nanoseconds timestamp of the observation
    pub observed_at: i64,
}

impl Tick {
    pub fn new(
        stream_id: impl Into<StreamId>,
        instrument: impl Into<InstrumentId>,
        price: Price,
        observed_at: i64,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            instrument: instrument.into(),
            price,
            observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_serialization() {
        let tick = Tick::new("feed-a", "AAPL", "187.42".parse().unwrap(), 1_708_123_456_789_000_000);
        let json = serde_json::to_string(&tick).unwrap();
        assert!(json.contains("\"stream_id\":\"feed-a\""));
        assert!(json.contains("\"price\":\"187.42\""));
    }
}
