//! Subscriber boundary
//!
//! The coordinator forwards every admitted price to a `PriceSink`. The
//! subscriber transport itself lives outside this crate; `BroadcastSink` fans
//! out to in-process receivers over a tokio broadcast channel.

use tokio::sync::broadcast;
use tracing::debug;
use types::tick::Tick;

use crate::events::PublishedPrice;

/// Receives admitted prices. Called at most once per admission.
pub trait PriceSink: Send + Sync {
    fn publish(&self, price: &PublishedPrice);
}

/// Notified of every tick recorded from a registered stream, before gating.
pub trait TickObserver: Send + Sync {
    fn on_price_received(&self, tick: &Tick);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PriceSink for NullSink {
    fn publish(&self, _price: &PublishedPrice) {}
}

/// Fan-out to any number of broadcast receivers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<PublishedPrice>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedPrice> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl PriceSink for BroadcastSink {
    fn publish(&self, price: &PublishedPrice) {
        if self.tx.send(price.clone()).is_err() {
            debug!(
                instrument = %price.instrument,
                "No subscribers for published price"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PublishReason;
    use types::ids::{InstrumentId, StreamId};
    use types::numeric::Price;

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let sink = BroadcastSink::new(16);
        let mut rx1 = sink.subscribe();
        let mut rx2 = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 2);

        let event = PublishedPrice::new(
            StreamId::new("feed-a"),
            InstrumentId::new("AAPL"),
            Price::from_u64(100),
            0,
            PublishReason::Tick,
        );
        sink.publish(&event);

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(4);
        sink.publish(&PublishedPrice::new(
            StreamId::new("feed-a"),
            InstrumentId::new("AAPL"),
            Price::from_u64(100),
            0,
            PublishReason::Tick,
        ));
        NullSink.publish(&PublishedPrice::new(
            StreamId::new("feed-a"),
            InstrumentId::new("AAPL"),
            Price::from_u64(100),
            0,
            PublishReason::Tick,
        ));
    }
}
