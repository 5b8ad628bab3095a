//! Delivery of sink updates after a cosmetic delay.
//!
//! Each queued update is held back by a random delay before it reaches the
//! sink. The delay only shapes presentation: the store was already written
//! when the update was queued.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

use crate::aggregator::Aggregator;
use crate::config::CosmeticDelay;
use crate::signal::SignalUpdate;
use crate::sink::Sink;

pub(crate) struct Presenter {
    updates: UnboundedReceiver<SignalUpdate>,
    sink: Arc<dyn Sink>,
    aggregator: Arc<Aggregator>,
    delay: CosmeticDelay,
}

impl Presenter {
    pub(crate) fn new(
        updates: UnboundedReceiver<SignalUpdate>,
        sink: Arc<dyn Sink>,
        aggregator: Arc<Aggregator>,
        delay: CosmeticDelay,
    ) -> Self {
        Self {
            updates,
            sink,
            aggregator,
            delay,
        }
    }

    /// Deliver updates until every collector is gone and nothing is pending.
    pub(crate) async fn run(mut self) {
        let mut pending = FuturesUnordered::new();
        let mut open = true;

        loop {
            tokio::select! {
                update = self.updates.recv(), if open => match update {
                    Some(update) => {
                        let delay = self.jitter();
                        pending.push(async move {
                            sleep(delay).await;
                            update
                        });
                    }
                    None => open = false,
                },
                Some(update) = pending.next(), if !pending.is_empty() => self.deliver(update),
                else => break,
            }
        }
        tracing::debug!(points = self.aggregator.points(), "presenter drained");
    }

    fn jitter(&self) -> Duration {
        let range = self.delay.range_ms();
        if range.start() >= range.end() {
            return Duration::from_millis(*range.start());
        }
        Duration::from_millis(rand::rng().random_range(range))
    }

    fn deliver(&self, update: SignalUpdate) {
        let sink = Arc::clone(&self.sink);
        let shown = std::panic::catch_unwind(AssertUnwindSafe(|| sink.notify(&update)));
        if let Err(panic) = shown {
            tracing::error!(key = %update.key, ?panic, "sink panicked while displaying update");
        }
        self.aggregator.count_point();
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use super::*;
    use crate::sink::RecordingSink;

    fn update(key: &str) -> SignalUpdate {
        SignalUpdate {
            key: key.to_string(),
            value: "v".to_string(),
            recorded: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_arrive_within_delay_window() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(RecordingSink::new());
        let aggregator = Arc::new(Aggregator::new());
        let presenter = Presenter::new(
            rx,
            sink.clone(),
            Arc::clone(&aggregator),
            CosmeticDelay::default(),
        );

        tx.send(update("os")).unwrap();
        tx.send(update("cpu")).unwrap();
        drop(tx);

        let start = Instant::now();
        presenter.run().await;
        let elapsed = start.elapsed();

        assert_eq!(sink.update_count(), 2);
        assert_eq!(aggregator.points(), 2);
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed <= Duration::from_millis(1510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_counted_before_delay() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(RecordingSink::new());
        let aggregator = Arc::new(Aggregator::new());
        let delay = CosmeticDelay::new(Duration::from_millis(800), Duration::from_millis(800));
        let handle = tokio::spawn(
            Presenter::new(rx, sink.clone(), Arc::clone(&aggregator), delay).run(),
        );

        tx.send(update("os")).unwrap();
        sleep(Duration::from_millis(799)).await;
        assert_eq!(aggregator.points(), 0);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(aggregator.points(), 1);

        drop(tx);
        handle.await.unwrap();
    }

    struct PanickingSink;

    impl Sink for PanickingSink {
        fn notify(&self, _update: &SignalUpdate) {
            panic!("display failed");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_panic_is_contained() {
        let (tx, rx) = mpsc::unbounded_channel();
        let aggregator = Arc::new(Aggregator::new());
        let presenter = Presenter::new(
            rx,
            Arc::new(PanickingSink),
            Arc::clone(&aggregator),
            CosmeticDelay::none(),
        );

        tx.send(update("os")).unwrap();
        drop(tx);
        presenter.run().await;
        assert_eq!(aggregator.points(), 1);
    }
}
