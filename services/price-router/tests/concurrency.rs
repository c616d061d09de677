//! Concurrency tests for the coordinator
//!
//! Many streams feed the same instruments in parallel. Per-instrument
//! serialization must keep the publication feed and the active assignment
//! consistent no matter how ticks interleave.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use price_router::config::RouterConfig;
use price_router::coordinator::StreamIngestCoordinator;
use price_router::events::{PublishReason, PublishedPrice};
use price_router::sink::PriceSink;
use price_router::worker::spawn_stream_worker;
use tokio::sync::mpsc;
use types::ids::{InstrumentId, StreamId};
use types::numeric::Price;
use types::tick::Tick;

const MS: i64 = 1_000_000;
const INSTRUMENTS: usize = 6;
const STREAMS_PER_INSTRUMENT: usize = 3;
const TICKS_PER_STREAM: i64 = 400;

#[derive(Default)]
struct RecordingSink {
    published: Mutex<Vec<PublishedPrice>>,
}

impl PriceSink for RecordingSink {
    fn publish(&self, price: &PublishedPrice) {
        self.published.lock().unwrap().push(price.clone());
    }
}

fn stream_name(instrument: usize, rank: usize) -> String {
    format!("feed-{instrument}-{rank}")
}

fn setup() -> (Arc<RecordingSink>, Arc<StreamIngestCoordinator>) {
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Arc::new(StreamIngestCoordinator::new(&RouterConfig::default(), sink.clone()));
    for i in 0..INSTRUMENTS {
        let instrument = InstrumentId::new(format!("SYM{i}"));
        for rank in 1..=STREAMS_PER_INSTRUMENT {
            coordinator
                .register_candidate(&instrument, &StreamId::new(stream_name(i, rank)), rank as i32)
                .unwrap();
        }
    }
    (sink, coordinator)
}

/// Tick `n` of a stream: jittery prices with periodic stale gaps on rank 1.
fn make_tick(instrument: usize, rank: usize, n: i64) -> Tick {
    let base = 100 + (n % 7) as u64 + rank as u64;
    let gap = if rank == 1 && n % 50 == 49 { 400 } else { 20 };
    Tick::new(
        stream_name(instrument, rank).as_str(),
        format!("SYM{instrument}").as_str(),
        Price::from_u64(base),
        n * 20 * MS + gap * MS,
    )
}

fn assert_feed_consistent(sink: &RecordingSink, coordinator: &StreamIngestCoordinator) {
    let published = sink.published.lock().unwrap();
    let mut per_instrument: BTreeMap<InstrumentId, Vec<&PublishedPrice>> = BTreeMap::new();
    for event in published.iter() {
        per_instrument.entry(event.instrument.clone()).or_default().push(event);
    }

    for (instrument, events) in per_instrument {
        for pair in events.windows(2) {
            assert_ne!(
                pair[0].price, pair[1].price,
                "{instrument}: identical consecutive publications"
            );
            if pair[1].reason == PublishReason::Tick && pair[0].stream_id == pair[1].stream_id {
                assert!(
                    pair[1].observed_at - pair[0].observed_at >= 50 * MS,
                    "{instrument}: publications inside the minimum interval"
                );
            }
        }

        // Forward-only failover: each forced publication comes from a
        // strictly higher rank than the one before it
        let ranks: BTreeMap<StreamId, i32> = coordinator
            .candidates(&instrument)
            .into_iter()
            .map(|c| (c.stream_id, c.preference_rank))
            .collect();
        let failover_ranks: Vec<i32> = events
            .iter()
            .filter(|e| e.reason == PublishReason::Failover)
            .map(|e| ranks[&e.stream_id])
            .collect();
        assert!(
            failover_ranks.windows(2).all(|w| w[0] < w[1]),
            "{instrument}: failover ranks not increasing: {failover_ranks:?}"
        );
        assert!(failover_ranks.iter().all(|rank| *rank > 1));

        // The active stream never ranks below the last failover target
        let active = coordinator.active_stream(&instrument).unwrap();
        if let Some(last) = failover_ranks.last() {
            assert!(ranks[&active] >= *last);
        }
    }
}

#[test]
fn parallel_streams_keep_per_instrument_invariants() {
    let (sink, coordinator) = setup();

    std::thread::scope(|scope| {
        for i in 0..INSTRUMENTS {
            for rank in 1..=STREAMS_PER_INSTRUMENT {
                let coordinator = &coordinator;
                scope.spawn(move || {
                    for n in 0..TICKS_PER_STREAM {
                        coordinator.on_tick(make_tick(i, rank, n));
                    }
                });
            }
        }
    });

    let total = (INSTRUMENTS * STREAMS_PER_INSTRUMENT) as u64 * TICKS_PER_STREAM as u64;
    let metrics = coordinator.metrics().export();
    assert_eq!(metrics["ticks_received"], total);
    assert_eq!(metrics["ticks_recorded"], total);
    assert_eq!(metrics["ticks_discarded"], 0);

    for i in 0..INSTRUMENTS {
        for rank in 1..=STREAMS_PER_INSTRUMENT {
            let stats = coordinator.statistics(&StreamId::new(stream_name(i, rank)));
            assert_eq!(stats.tick_count, TICKS_PER_STREAM as u64);
            assert!(stats.min_price <= stats.max_price);
        }
    }

    assert_feed_consistent(&sink, &coordinator);
}

#[test]
fn parallel_deregistration_keeps_instruments_published() {
    let (sink, coordinator) = setup();
    for i in 0..INSTRUMENTS {
        coordinator.on_tick(make_tick(i, 1, 0));
    }
    // Primaries drop out before any standby has delivered
    for i in 0..INSTRUMENTS {
        coordinator.deregister_stream(&StreamId::new(stream_name(i, 1))).unwrap();
    }

    std::thread::scope(|scope| {
        for i in 0..INSTRUMENTS {
            for rank in 1..=STREAMS_PER_INSTRUMENT {
                let coordinator = &coordinator;
                scope.spawn(move || {
                    for n in 1..TICKS_PER_STREAM {
                        coordinator.on_tick(make_tick(i, rank, n));
                    }
                });
            }
        }
    });

    for i in 0..INSTRUMENTS {
        let instrument = InstrumentId::new(format!("SYM{i}"));
        let active = coordinator.active_stream(&instrument).unwrap();
        assert_ne!(active, StreamId::new(stream_name(i, 1)), "{instrument} went dark");
        assert_eq!(coordinator.statistics(&StreamId::new(stream_name(i, 1))).tick_count, 1);
    }
    assert_feed_consistent(&sink, &coordinator);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stream_workers_drain_all_ticks() {
    let (sink, coordinator) = setup();

    let mut senders = Vec::new();
    let mut handles = Vec::new();
    for i in 0..INSTRUMENTS {
        for rank in 1..=STREAMS_PER_INSTRUMENT {
            let (tx, rx) = mpsc::channel(64);
            handles.push(spawn_stream_worker(
                coordinator.clone(),
                StreamId::new(stream_name(i, rank)),
                rx,
            ));
            senders.push((i, rank, tx));
        }
    }

    let producers: Vec<_> = senders
        .into_iter()
        .map(|(i, rank, tx)| {
            tokio::spawn(async move {
                for n in 0..TICKS_PER_STREAM {
                    tx.send(make_tick(i, rank, n)).await.unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.await.unwrap();
    }

    let mut processed = 0;
    let mut published = 0;
    for handle in handles {
        let report = handle.await.unwrap();
        assert_eq!(report.ticks_discarded, 0);
        assert_eq!(report.ticks_misrouted, 0);
        processed += report.ticks_processed;
        published += report.prices_published;
    }

    assert_eq!(processed, (INSTRUMENTS * STREAMS_PER_INSTRUMENT) as u64 * TICKS_PER_STREAM as u64);
    assert_eq!(published as usize, sink.published.lock().unwrap().len());
    assert_feed_consistent(&sink, &coordinator);
}
