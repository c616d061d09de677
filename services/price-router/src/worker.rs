//! Per-stream workers
//!
//! One tokio task per physical stream drains that stream's tick queue into
//! the coordinator. Ticks from one stream are processed strictly in delivery
//! order; different streams run in parallel. A worker stops when the
//! transport drops its sender.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::ids::StreamId;
use types::tick::Tick;

use crate::coordinator::StreamIngestCoordinator;

/// Totals reported by a worker when its stream closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub stream_id: StreamId,
    pub ticks_processed: u64,
    /// Ticks discarded by the coordinator (unregistered stream).
    pub ticks_discarded: u64,
    /// Ticks carrying a different stream id than the worker's.
    pub ticks_misrouted: u64,
    pub prices_published: u64,
}

impl WorkerReport {
    fn new(stream_id: StreamId) -> Self {
        Self {
            stream_id,
            ticks_processed: 0,
            ticks_discarded: 0,
            ticks_misrouted: 0,
            prices_published: 0,
        }
    }
}

/// Spawn the worker for `stream_id`, consuming ticks from `rx`.
pub fn spawn_stream_worker(
    coordinator: Arc<StreamIngestCoordinator>,
    stream_id: StreamId,
    mut rx: mpsc::Receiver<Tick>,
) -> JoinHandle<WorkerReport> {
    tokio::spawn(async move {
        info!(stream = %stream_id, "Stream worker started");
        let mut report = WorkerReport::new(stream_id.clone());

        while let Some(tick) = rx.recv().await {
            if tick.stream_id != stream_id {
                report.ticks_misrouted += 1;
                warn!(
                    worker = %stream_id,
                    stream = %tick.stream_id,
                    "Dropping tick delivered to the wrong stream worker"
                );
                continue;
            }

            let outcome = coordinator.on_tick(tick);
            if outcome.recorded {
                report.ticks_processed += 1;
            } else {
                report.ticks_discarded += 1;
            }
            report.prices_published += outcome.published.len() as u64;
        }

        info!(
            stream = %stream_id,
            processed = report.ticks_processed,
            discarded = report.ticks_discarded,
            published = report.prices_published,
            "Stream worker stopped"
        );
        report
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::sink::NullSink;
    use types::ids::InstrumentId;
    use types::numeric::Price;

    #[tokio::test]
    async fn test_worker_processes_in_order_and_reports() {
        let coordinator = Arc::new(StreamIngestCoordinator::new(&RouterConfig::default(), Arc::new(NullSink)));
        coordinator
            .register_candidate(&InstrumentId::new("AAPL"), &StreamId::new("A"), 1)
            .unwrap();

        let (tx, rx) = mpsc::channel(16);
        let handle = spawn_stream_worker(coordinator.clone(), StreamId::new("A"), rx);

        for (i, p) in [100u64, 101, 102].iter().enumerate() {
            tx.send(Tick::new("A", "AAPL", Price::from_u64(*p), i as i64 * 60_000_000))
                .await
                .unwrap();
        }
        tx.send(Tick::new("B", "AAPL", Price::from_u64(1), 0)).await.unwrap();
        drop(tx);

        let report = handle.await.unwrap();
        assert_eq!(report.ticks_processed, 3);
        assert_eq!(report.ticks_misrouted, 1);
        assert_eq!(report.prices_published, 3);

        let stats = coordinator.statistics(&StreamId::new("A"));
        assert_eq!(stats.last_price, Price::from_u64(102));
    }
}
