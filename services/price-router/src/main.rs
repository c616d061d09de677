use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use price_router::config::RouterConfig;
use price_router::coordinator::StreamIngestCoordinator;
use price_router::sink::BroadcastSink;
use price_router::worker::spawn_stream_worker;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use types::ids::StreamId;
use types::numeric::Price;
use types::tick::{Tick, NANOS_PER_MILLI};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let demo = args.iter().any(|a| a == "--demo");
    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => RouterConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => demo_config(),
    };

    tracing::info!(
        version = price_router::SERVICE_VERSION,
        candidates = config.candidates.len(),
        "Starting price router"
    );

    let sink = Arc::new(BroadcastSink::new(4096));
    let mut subscriber = sink.subscribe();
    let coordinator = Arc::new(StreamIngestCoordinator::new(&config, sink.clone()));
    coordinator.register_all(&config.candidates)?;

    // Log every published price
    let subscriber_task = tokio::spawn(async move {
        while let Ok(price) = subscriber.recv().await {
            tracing::info!(
                instrument = %price.instrument,
                stream = %price.stream_id,
                price = %price.price,
                reason = ?price.reason,
                "Published"
            );
        }
    });

    // One worker per configured stream; the transport owns the senders
    let mut senders: BTreeMap<StreamId, mpsc::Sender<Tick>> = BTreeMap::new();
    let mut workers = Vec::new();
    for candidate in &config.candidates {
        if senders.contains_key(&candidate.stream) {
            continue;
        }
        let (tx, rx) = mpsc::channel(config.stream_channel_capacity);
        workers.push(spawn_stream_worker(coordinator.clone(), candidate.stream.clone(), rx));
        senders.insert(candidate.stream.clone(), tx);
    }

    if demo {
        replay_failover_scenario(&senders).await?;
    } else {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");
    }

    drop(senders);
    for worker in workers {
        let report = worker.await?;
        tracing::info!(stream = %report.stream_id, processed = report.ticks_processed, "Worker finished");
    }
    drop(coordinator);
    drop(sink);
    subscriber_task.await?;

    Ok(())
}

fn demo_config() -> RouterConfig {
    RouterConfig::from_toml_str(
        r#"
        [[candidates]]
        instrument = "X"
        stream = "A"
        rank = 1

        [[candidates]]
        instrument = "X"
        stream = "B"
        rank = 2
        "#,
    )
    .unwrap_or_default()
}

/// Stale primary, standby with data, forced publication of the standby.
async fn replay_failover_scenario(
    senders: &BTreeMap<StreamId, mpsc::Sender<Tick>>,
) -> Result<(), anyhow::Error> {
    let script = [("A", 100u64, 0i64), ("A", 100, 200), ("B", 101, 250), ("A", 100, 400)];
    for (stream, price, at_ms) in script {
        let stream_id = StreamId::new(stream);
        let Some(tx) = senders.get(&stream_id) else {
            tracing::warn!(stream, "Demo stream not configured");
            continue;
        };
        tx.send(Tick::new(stream, "X", Price::from_u64(price), at_ms * NANOS_PER_MILLI))
            .await
            .context("stream worker stopped")?;
        // Keep cross-stream ordering deterministic for the demo
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    Ok(())
}
