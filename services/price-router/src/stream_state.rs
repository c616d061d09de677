//! Last-seen price and time per stream
//!
//! Created lazily on the first tick of a stream and never deleted while the
//! process runs, so a deregistered stream keeps its history.

use dashmap::DashMap;
use types::ids::StreamId;
use types::numeric::Price;
use types::tick::Tick;

/// Latest observation of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamState {
    pub last_price: Price,
    /// Unix nanos of the latest tick.
    pub last_observed_at: i64,
}

#[derive(Debug, Default)]
pub struct StreamStateStore {
    states: DashMap<StreamId, StreamState>,
}

impl StreamStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the tick as the stream's latest observation, returning the
    /// previous one (None on the first tick).
    pub fn update(&self, tick: &Tick) -> Option<StreamState> {
        let next = StreamState {
            last_price: tick.price,
            last_observed_at: tick.observed_at,
        };
        match self.states.get_mut(&tick.stream_id) {
            Some(mut state) => Some(std::mem::replace(&mut *state, next)),
            None => self.states.insert(tick.stream_id.clone(), next),
        }
    }

    pub fn get(&self, stream_id: &StreamId) -> Option<StreamState> {
        self.states.get(stream_id).map(|s| *s)
    }

    pub fn has_data(&self, stream_id: &StreamId) -> bool {
        self.states.contains_key(stream_id)
    }
}
