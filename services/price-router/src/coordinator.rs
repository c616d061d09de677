//! Stream ingest coordinator
//!
//! Entry point invoked once per received tick. Applies the tick to stream
//! state and statistics, runs failover evaluation when the tick comes from
//! the instrument's active stream, and forwards admitted prices to the sink.
//!
//! # Serialization
//!
//! Every tick, registration and deregistration for an instrument runs under
//! that instrument's lane lock, so evaluate-then-publish never interleaves
//! between two streams of the same instrument. Unrelated instruments never
//! contend. The sink is called with the lane held and must not block.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;
use types::ids::{InstrumentId, StreamId};
use types::numeric::Price;
use types::tick::Tick;

use crate::config::{CandidateConfig, RouterConfig};
use crate::events::{PublishReason, PublishedPrice, TickOutcome};
use crate::failover::{
    Deregistration, FailoverDecision, FailoverPolicy, FailoverRouter, Registration, RouterError,
    StreamCandidate,
};
use crate::metrics::IngestMetrics;
use crate::publication::{PublicationGate, PublicationRecord};
use crate::sink::{PriceSink, TickObserver};
use crate::statistics::{StatisticsTracker, StockStatistics};
use crate::stream_state::StreamStateStore;

type Lane = Arc<Mutex<()>>;

pub struct StreamIngestCoordinator {
    policy: FailoverPolicy,
    router: FailoverRouter,
    streams: StreamStateStore,
    statistics: StatisticsTracker,
    gate: PublicationGate,
    /// One exclusion scope per instrument.
    lanes: DashMap<InstrumentId, Lane>,
    sink: Arc<dyn PriceSink>,
    observer: Option<Arc<dyn TickObserver>>,
    metrics: Arc<IngestMetrics>,
}

impl StreamIngestCoordinator {
    pub fn new(config: &RouterConfig, sink: Arc<dyn PriceSink>) -> Self {
        Self {
            policy: config.failover_policy(),
            router: FailoverRouter::new(),
            streams: StreamStateStore::new(),
            statistics: StatisticsTracker::new(),
            gate: PublicationGate::new(config.min_publish_interval_ns(), config.publication_scope),
            lanes: DashMap::new(),
            sink,
            observer: None,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Attach an observer notified of every recorded tick.
    pub fn with_observer(mut self, observer: Arc<dyn TickObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Register a candidate stream for an instrument.
    pub fn register_candidate(
        &self,
        instrument: &InstrumentId,
        stream_id: &StreamId,
        preference_rank: i32,
    ) -> Result<Registration, RouterError> {
        let lane = self.lanes.entry(instrument.clone()).or_default().clone();
        let _guard = lane.lock().unwrap_or_else(PoisonError::into_inner);
        self.router.register_candidate(instrument, stream_id, preference_rank)
    }

    /// Register every candidate from configuration, stopping at the first error.
    pub fn register_all(&self, candidates: &[CandidateConfig]) -> Result<(), RouterError> {
        for candidate in candidates {
            self.register_candidate(&candidate.instrument, &candidate.stream, candidate.rank)?;
        }
        Ok(())
    }

    /// Mark a stream unavailable. If it was active, the next eligible
    /// candidate takes over and its last price is force-published.
    pub fn deregister_stream(&self, stream_id: &StreamId) -> Result<Deregistration, RouterError> {
        let instrument = self
            .router
            .instrument_for(stream_id)
            .ok_or_else(|| RouterError::UnknownStream(stream_id.clone()))?;
        let lane = self.lane(&instrument).ok_or_else(|| RouterError::UnknownStream(stream_id.clone()))?;
        let _guard = lane.lock().unwrap_or_else(PoisonError::into_inner);

        let deregistration = self.router.deregister_stream(stream_id, &self.streams)?;
        let mut published = Vec::new();
        self.apply_decision(&deregistration.decision, &mut published);
        Ok(deregistration)
    }

    /// Process one tick.
    pub fn on_tick(&self, tick: Tick) -> TickOutcome {
        let started = Instant::now();
        self.metrics.record_received();

        let Some(lane) = self.lane(&tick.instrument) else {
            return self.discard(&tick);
        };
        let _guard = lane.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.router.is_available_candidate(&tick.instrument, &tick.stream_id) {
            return self.discard(&tick);
        }

        let prior = self.streams.update(&tick);
        if self.statistics.record(&tick.stream_id, tick.price, tick.observed_at) {
            self.metrics.record_fluctuation_saturated();
            debug!(stream = %tick.stream_id, "Cumulative fluctuation saturated");
        }
        if let Some(observer) = &self.observer {
            observer.on_price_received(&tick);
        }

        let evaluation = self
            .router
            .evaluate(&tick, prior.as_ref(), &self.policy, &self.streams);
        let decision = evaluation.decision;
        if evaluation.divergence_skipped {
            self.metrics.record_divergence_skipped();
        }

        let mut published = Vec::new();
        if decision != FailoverDecision::NotActive {
            self.apply_decision(&decision, &mut published);

            // A switch away from this stream suppresses its own tick.
            if self.router.active_stream(&tick.instrument).as_ref() == Some(&tick.stream_id) {
                self.forward(
                    &tick.stream_id,
                    &tick.instrument,
                    tick.price,
                    tick.observed_at,
                    PublishReason::Tick,
                    &mut published,
                );
            }
        }

        let elapsed_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.metrics.record_recorded(elapsed_ns);

        TickOutcome {
            recorded: true,
            decision,
            published,
        }
    }

    fn lane(&self, instrument: &InstrumentId) -> Option<Lane> {
        self.lanes.get(instrument).map(|lane| lane.clone())
    }

    fn discard(&self, tick: &Tick) -> TickOutcome {
        self.metrics.record_discarded();
        debug!(
            stream = %tick.stream_id,
            instrument = %tick.instrument,
            "Discarding tick from unregistered stream"
        );
        TickOutcome::discarded()
    }

    fn apply_decision(&self, decision: &FailoverDecision, published: &mut Vec<PublishedPrice>) {
        match decision {
            FailoverDecision::Switched { publish, .. } => {
                self.metrics.record_failover();
                self.forward(
                    &publish.stream_id,
                    &publish.instrument,
                    publish.price,
                    publish.observed_at,
                    PublishReason::Failover,
                    published,
                );
            }
            FailoverDecision::Degraded { .. } => self.metrics.record_degraded(),
            FailoverDecision::NotActive | FailoverDecision::Healthy => {}
        }
    }

    fn forward(
        &self,
        stream_id: &StreamId,
        instrument: &InstrumentId,
        price: Price,
        observed_at: i64,
        reason: PublishReason,
        published: &mut Vec<PublishedPrice>,
    ) {
        let forced = reason == PublishReason::Failover;
        let admission = self.gate.admit(instrument, price, observed_at, forced);
        self.metrics.record_admission(admission, forced);
        if !admission.is_admitted() {
            return;
        }

        let event = PublishedPrice::new(stream_id.clone(), instrument.clone(), price, observed_at, reason);
        debug!(
            stream = %stream_id,
            instrument = %instrument,
            price = %price,
            reason = ?reason,
            "Price published"
        );
        self.sink.publish(&event);
        published.push(event);
    }

    /// Statistics snapshot for a stream (zeroed if unknown).
    pub fn statistics(&self, stream_id: &StreamId) -> StockStatistics {
        self.statistics.read(stream_id)
    }

    pub fn statistics_tracker(&self) -> &StatisticsTracker {
        &self.statistics
    }

    pub fn active_stream(&self, instrument: &InstrumentId) -> Option<StreamId> {
        self.router.active_stream(instrument)
    }

    pub fn candidates(&self, instrument: &InstrumentId) -> Vec<StreamCandidate> {
        self.router.candidates(instrument)
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.router.instruments()
    }

    pub fn last_published(&self, instrument: &InstrumentId) -> Option<PublicationRecord> {
        self.gate.last_published(instrument)
    }

    pub fn metrics(&self) -> Arc<IngestMetrics> {
        Arc::clone(&self.metrics)
    }
}
