//! Failover router
//!
//! Owns, per instrument, the ranked set of candidate streams and the stream
//! currently treated as authoritative. Each tick on the active stream is
//! checked against the stream's previous observation; a stale gap or an
//! excessive price move advances the active slot to the next eligible
//! candidate and yields that candidate's last price for forced publication.
//!
//! Switching only moves forward through the rank order. A recovered stream
//! with a lower rank is never re-selected automatically.
//!
//! When the active stream was deregistered with no eligible target, it stays
//! assigned until a tick arrives on a standby that can take over.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use types::ids::{InstrumentId, StreamId};
use types::numeric::Price;
use types::tick::Tick;

use crate::stream_state::{StreamState, StreamStateStore};

/// Errors raised by administrative router operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("stream {stream} is already bound to instrument {bound_to}, cannot bind to {requested}")]
    StreamBoundElsewhere {
        stream: StreamId,
        bound_to: InstrumentId,
        requested: InstrumentId,
    },

    #[error("stream {stream} already registered with rank {existing}, requested rank {requested}")]
    RankConflict {
        stream: StreamId,
        existing: i32,
        requested: i32,
    },

    #[error("stream {0} has no registered candidate")]
    UnknownStream(StreamId),
}

/// Thresholds applied when evaluating the active stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailoverPolicy {
    /// Maximum tolerated gap between consecutive ticks, in nanoseconds.
    pub stale_threshold_ns: i64,
    /// Maximum tolerated tick-to-tick move, in percent.
    pub divergence_threshold_percent: u32,
}

/// A stream configured to feed an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCandidate {
    pub stream_id: StreamId,
    pub instrument: InstrumentId,
    /// Lower rank = more preferred.
    pub preference_rank: i32,
    /// False once the stream has been deregistered.
    pub available: bool,
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The candidate is now the instrument's active stream.
    Activated,
    /// The candidate was added behind the active stream.
    Added,
    /// Identical candidate already present; nothing changed.
    AlreadyRegistered,
    /// A deregistered candidate was made available again.
    Reenabled,
}

/// Why the active stream was judged unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// Gap since the previous tick exceeded the stale threshold.
    Stale { gap_ns: i64 },
    /// Price moved by more than the divergence threshold.
    Divergent { percent: Decimal },
    /// The active stream was deregistered.
    Deregistered,
}

/// Last known price of the newly active stream, to publish immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedPublication {
    pub stream_id: StreamId,
    pub instrument: InstrumentId,
    pub price: Price,
    pub observed_at: i64,
}

/// Outcome of evaluating a tick against the failover policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailoverDecision {
    /// Tick stream is not the instrument's active stream; nothing evaluated.
    NotActive,
    /// Active stream is within thresholds.
    Healthy,
    /// Active stream replaced; `publish` carries the forced publication.
    Switched {
        from: StreamId,
        to: StreamId,
        reason: TriggerReason,
        publish: ForcedPublication,
    },
    /// Thresholds breached but no eligible target; active stream kept.
    Degraded { reason: TriggerReason },
}

impl FailoverDecision {
    pub fn switched(&self) -> bool {
        matches!(self, FailoverDecision::Switched { .. })
    }

    pub fn forced_publication(&self) -> Option<&ForcedPublication> {
        match self {
            FailoverDecision::Switched { publish, .. } => Some(publish),
            _ => None,
        }
    }
}

/// Result of deregistering a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deregistration {
    pub instrument: InstrumentId,
    /// `NotActive` when the stream was a standby candidate.
    pub decision: FailoverDecision,
}

/// Failover decision for a tick plus whether its divergence check was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: FailoverDecision,
    pub divergence_skipped: bool,
}

impl From<FailoverDecision> for Evaluation {
    fn from(decision: FailoverDecision) -> Self {
        Self {
            decision,
            divergence_skipped: false,
        }
    }
}

#[derive(Debug)]
struct InstrumentRoute {
    candidates: Vec<StreamCandidate>,
    active: StreamId,
    failovers: u64,
}

impl InstrumentRoute {
    fn candidate(&self, stream_id: &StreamId) -> Option<&StreamCandidate> {
        self.candidates.iter().find(|c| &c.stream_id == stream_id)
    }

    fn active_available(&self) -> bool {
        self.candidate(&self.active).is_some_and(|c| c.available)
    }

    fn active_rank(&self) -> i32 {
        self.candidate(&self.active)
            .map(|c| c.preference_rank)
            .unwrap_or(i32::MIN)
    }

    /// Smallest available rank above the active one that has data
    /// (tie-break: lowest stream id).
    fn next_eligible(&self, streams: &StreamStateStore) -> Option<(StreamId, StreamState)> {
        let active_rank = self.active_rank();
        self.candidates
            .iter()
            .filter(|c| c.available && c.preference_rank > active_rank)
            .filter_map(|c| streams.get(&c.stream_id).map(|state| (c, state)))
            .min_by(|(a, _), (b, _)| {
                a.preference_rank
                    .cmp(&b.preference_rank)
                    .then_with(|| a.stream_id.cmp(&b.stream_id))
            })
            .map(|(c, state)| (c.stream_id.clone(), state))
    }

    fn switch(
        &mut self,
        instrument: &InstrumentId,
        reason: TriggerReason,
        streams: &StreamStateStore,
    ) -> FailoverDecision {
        match self.next_eligible(streams) {
            Some((next, state)) => {
                let from = std::mem::replace(&mut self.active, next.clone());
                self.failovers += 1;
                info!(
                    instrument = %instrument,
                    from = %from,
                    to = %next,
                    reason = ?reason,
                    failovers = self.failovers,
                    "Active stream switched"
                );
                FailoverDecision::Switched {
                    from,
                    to: next.clone(),
                    reason,
                    publish: ForcedPublication {
                        stream_id: next,
                        instrument: instrument.clone(),
                        price: state.last_price,
                        observed_at: state.last_observed_at,
                    },
                }
            }
            None => {
                warn!(
                    instrument = %instrument,
                    active = %self.active,
                    reason = ?reason,
                    "No eligible failover target, keeping degraded stream"
                );
                FailoverDecision::Degraded { reason }
            }
        }
    }
}

/// Result of checking a tick against the failover thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCheck {
    /// Within both thresholds.
    Clear,
    /// Not stale, and the divergence check could not be computed.
    DivergenceSkipped,
    Triggered(TriggerReason),
}

/// Check a tick against its stream's previous observation.
///
/// The divergence check is skipped when the previous price is zero or the
/// percentage overflows.
pub fn detect_trigger(
    price: Price,
    observed_at: i64,
    prior: &StreamState,
    policy: &FailoverPolicy,
) -> TriggerCheck {
    let gap_ns = observed_at.saturating_sub(prior.last_observed_at);
    if gap_ns > policy.stale_threshold_ns {
        return TriggerCheck::Triggered(TriggerReason::Stale { gap_ns });
    }

    match divergence_percent(price, prior.last_price) {
        None => TriggerCheck::DivergenceSkipped,
        Some(percent) if percent > Decimal::from(policy.divergence_threshold_percent) => {
            TriggerCheck::Triggered(TriggerReason::Divergent { percent })
        }
        Some(_) => TriggerCheck::Clear,
    }
}

/// |price - prior| / prior * 100, or None when undefined.
pub fn divergence_percent(price: Price, prior: Price) -> Option<Decimal> {
    if prior.is_zero() {
        return None;
    }
    price
        .checked_abs_diff(prior)?
        .checked_div(prior.as_decimal().abs())?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// Per-instrument candidate sets and active stream assignments.
#[derive(Debug, Default)]
pub struct FailoverRouter {
    routes: DashMap<InstrumentId, InstrumentRoute>,
    bindings: DashMap<StreamId, InstrumentId>,
}

impl FailoverRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candidate stream for an instrument.
    pub fn register_candidate(
        &self,
        instrument: &InstrumentId,
        stream_id: &StreamId,
        preference_rank: i32,
    ) -> Result<Registration, RouterError> {
        // Held until the route is updated so a stream binds to one instrument
        // even when two instruments register it concurrently.
        let binding = self.bindings.entry(stream_id.clone());
        if let Entry::Occupied(bound) = &binding {
            if bound.get() != instrument {
                return Err(RouterError::StreamBoundElsewhere {
                    stream: stream_id.clone(),
                    bound_to: bound.get().clone(),
                    requested: instrument.clone(),
                });
            }
        }

        let candidate = StreamCandidate {
            stream_id: stream_id.clone(),
            instrument: instrument.clone(),
            preference_rank,
            available: true,
        };

        let registration = match self.routes.entry(instrument.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(InstrumentRoute {
                    candidates: vec![candidate],
                    active: stream_id.clone(),
                    failovers: 0,
                });
                Registration::Activated
            }
            Entry::Occupied(mut occupied) => {
                let route = occupied.get_mut();
                let active_rank = route.active_rank();
                match route.candidates.iter_mut().find(|c| &c.stream_id == stream_id) {
                    Some(existing) if existing.preference_rank != preference_rank => {
                        return Err(RouterError::RankConflict {
                            stream: stream_id.clone(),
                            existing: existing.preference_rank,
                            requested: preference_rank,
                        });
                    }
                    Some(existing) if existing.available => Registration::AlreadyRegistered,
                    Some(existing) => {
                        existing.available = true;
                        Registration::Reenabled
                    }
                    None => {
                        route.candidates.push(candidate);
                        // Before the first failover the lowest rank owns the slot.
                        if route.failovers == 0 && preference_rank < active_rank {
                            route.active = stream_id.clone();
                            Registration::Activated
                        } else {
                            Registration::Added
                        }
                    }
                }
            }
        };

        binding.or_insert_with(|| instrument.clone());

        info!(
            instrument = %instrument,
            stream = %stream_id,
            rank = preference_rank,
            outcome = ?registration,
            "Candidate registered"
        );
        Ok(registration)
    }

    /// Mark a stream unavailable for future selection.
    ///
    /// History is kept. If the stream was active, the router advances to the
    /// next eligible candidate immediately.
    pub fn deregister_stream(
        &self,
        stream_id: &StreamId,
        streams: &StreamStateStore,
    ) -> Result<Deregistration, RouterError> {
        let instrument = self
            .bindings
            .get(stream_id)
            .map(|i| i.value().clone())
            .ok_or_else(|| RouterError::UnknownStream(stream_id.clone()))?;

        let mut route = self
            .routes
            .get_mut(&instrument)
            .ok_or_else(|| RouterError::UnknownStream(stream_id.clone()))?;

        if let Some(candidate) = route.candidates.iter_mut().find(|c| &c.stream_id == stream_id) {
            candidate.available = false;
        }

        let decision = if &route.active == stream_id {
            route.switch(&instrument, TriggerReason::Deregistered, streams)
        } else {
            FailoverDecision::NotActive
        };

        info!(instrument = %instrument, stream = %stream_id, "Stream deregistered");
        Ok(Deregistration {
            instrument,
            decision,
        })
    }

    /// Evaluate a tick on `tick.stream_id` against its previous observation.
    ///
    /// `prior` is the stream state before this tick was applied. A standby
    /// tick is only acted on while the active stream is deregistered: if the
    /// standby ranks above it, the router advances.
    pub fn evaluate(
        &self,
        tick: &Tick,
        prior: Option<&StreamState>,
        policy: &FailoverPolicy,
        streams: &StreamStateStore,
    ) -> Evaluation {
        let Some(mut route) = self.routes.get_mut(&tick.instrument) else {
            return FailoverDecision::NotActive.into();
        };
        if route.active != tick.stream_id {
            let takes_over = !route.active_available()
                && route
                    .candidate(&tick.stream_id)
                    .is_some_and(|c| c.available && c.preference_rank > route.active_rank());
            if !takes_over {
                return FailoverDecision::NotActive.into();
            }
            return route
                .switch(&tick.instrument, TriggerReason::Deregistered, streams)
                .into();
        }
        let Some(prior) = prior else {
            return FailoverDecision::Healthy.into();
        };

        let check = detect_trigger(tick.price, tick.observed_at, prior, policy);
        let decision = match check {
            TriggerCheck::Triggered(reason) => route.switch(&tick.instrument, reason, streams),
            TriggerCheck::Clear | TriggerCheck::DivergenceSkipped => {
                debug!(
                    instrument = %tick.instrument,
                    stream = %tick.stream_id,
                    "Active stream healthy"
                );
                FailoverDecision::Healthy
            }
        };
        Evaluation {
            decision,
            divergence_skipped: check == TriggerCheck::DivergenceSkipped,
        }
    }

    /// Current active stream for an instrument.
    pub fn active_stream(&self, instrument: &InstrumentId) -> Option<StreamId> {
        self.routes.get(instrument).map(|r| r.active.clone())
    }

    /// Instrument a stream is bound to, if registered.
    pub fn instrument_for(&self, stream_id: &StreamId) -> Option<InstrumentId> {
        self.bindings.get(stream_id).map(|i| i.value().clone())
    }

    /// Whether the stream is an available candidate of the instrument.
    pub fn is_available_candidate(&self, instrument: &InstrumentId, stream_id: &StreamId) -> bool {
        self.routes
            .get(instrument)
            .and_then(|r| r.candidate(stream_id).map(|c| c.available))
            .unwrap_or(false)
    }

    /// Candidates of an instrument ordered by (rank, stream id).
    pub fn candidates(&self, instrument: &InstrumentId) -> Vec<StreamCandidate> {
        let mut candidates = self
            .routes
            .get(instrument)
            .map(|r| r.candidates.clone())
            .unwrap_or_default();
        candidates.sort_by(|a, b| {
            a.preference_rank
                .cmp(&b.preference_rank)
                .then_with(|| a.stream_id.cmp(&b.stream_id))
        });
        candidates
    }

    /// Number of switches performed for an instrument.
    pub fn failover_count(&self, instrument: &InstrumentId) -> u64 {
        self.routes.get(instrument).map(|r| r.failovers).unwrap_or(0)
    }

    /// All instruments with at least one candidate.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut instruments: Vec<InstrumentId> = self.routes.iter().map(|r| r.key().clone()).collect();
        instruments.sort();
        instruments
    }
}
