//! Price broadcaster
//!
//! Fans price snapshots out to subscribers, suppressing no-op updates per
//! subscriber. Transport-agnostic: each subscriber is a bounded channel and
//! the transport layer drains it.

use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wager_core::{Instrument, PriceSnapshot, PriceUpdate};

/// Per-subscriber queue depth
const SUBSCRIBER_BUFFER: usize = 32;

/// Unique identifier for a feed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Delivery state for one subscriber
struct Subscriber {
    tx: mpsc::Sender<PriceUpdate>,
    /// Prices this subscriber last received; `None` until its first delivery
    last_sent: Option<BTreeMap<Instrument, Decimal>>,
}

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub unchanged: usize,
    pub lagging: usize,
    pub dropped: usize,
}

/// Pushes price updates to subscribers only when their view changed
pub struct PriceBroadcaster {
    /// Next subscriber ID to assign
    next_id: AtomicU64,
    subscribers: DashMap<SubscriberId, Subscriber>,
    /// Most recent published snapshot, used to prime new subscribers
    latest: RwLock<Option<PriceSnapshot>>,
}

impl PriceBroadcaster {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: DashMap::new(),
            latest: RwLock::new(None),
        }
    }

    /// Register a subscriber
    ///
    /// If a snapshot has already been published the subscriber is primed
    /// with it immediately.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<PriceUpdate>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        // Holding `latest` until the insert keeps a concurrent publish from
        // landing between priming and registration
        let latest = self.latest.read();
        let mut last_sent = None;
        if let Some(snapshot) = latest.as_ref() {
            if tx.try_send(snapshot.to_update()).is_ok() {
                last_sent = Some(snapshot.prices.clone());
            }
        }
        self.subscribers.insert(id, Subscriber { tx, last_sent });
        drop(latest);
        debug!("{} subscribed to price feed", id);

        (id, rx)
    }

    /// Discard a subscriber and its delivery state
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            info!("{} disconnected from price feed", id);
        }
    }

    /// Deliver `snapshot` to every subscriber whose last view differs
    ///
    /// Empty snapshots are never published.
    pub fn publish(&self, snapshot: &PriceSnapshot) -> PublishReport {
        let mut report = PublishReport::default();
        if snapshot.is_empty() {
            return report;
        }

        // Lock order is always `latest` then `subscribers`
        let mut latest = self.latest.write();
        *latest = Some(snapshot.clone());
        let update = snapshot.to_update();
        let mut closed = Vec::new();

        for mut entry in self.subscribers.iter_mut() {
            let subscriber = entry.value_mut();
            let changed = subscriber
                .last_sent
                .as_ref()
                .is_none_or(|last| snapshot.differs_from(last));
            if !changed {
                report.unchanged += 1;
                continue;
            }

            match subscriber.tx.try_send(update.clone()) {
                Ok(()) => {
                    subscriber.last_sent = Some(snapshot.prices.clone());
                    report.delivered += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("{} is lagging, skipping update", entry.key());
                    report.lagging += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    closed.push(*entry.key());
                }
            }
        }
        drop(latest);

        for id in closed {
            self.subscribers.remove(&id);
            report.dropped += 1;
            debug!("{} receiver gone, removed", id);
        }

        report
    }

    /// Most recently published snapshot
    pub fn latest(&self) -> Option<PriceSnapshot> {
        self.latest.read().clone()
    }

    /// Get total number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for PriceBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PriceBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use wager_core::PriceOrigin;

    fn snapshot(btc: Decimal) -> PriceSnapshot {
        let mut prices = BTreeMap::new();
        prices.insert(Instrument::Bitcoin, btc);
        prices.insert(Instrument::Ethereum, dec!(3000));
        PriceSnapshot::new(prices, PriceOrigin::Simulated, Utc::now())
    }

    #[test]
    fn test_duplicate_publish_delivers_once() {
        let broadcaster = PriceBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();

        let snap = snapshot(dec!(50000));
        assert_eq!(broadcaster.publish(&snap).delivered, 1);
        let second = broadcaster.publish(&snap);
        assert_eq!(second.delivered, 0);
        assert_eq!(second.unchanged, 1);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_change_is_delivered() {
        let broadcaster = PriceBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();

        broadcaster.publish(&snapshot(dec!(50000)));
        broadcaster.publish(&snapshot(dec!(50000.01)));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.0[&Instrument::Bitcoin], 50000.0);
        assert_eq!(second.0[&Instrument::Bitcoin], 50000.01);
    }

    #[test]
    fn test_subscribers_tracked_independently() {
        let broadcaster = PriceBroadcaster::new();
        let (_a, mut rx_a) = broadcaster.subscribe();

        let snap = snapshot(dec!(50000));
        broadcaster.publish(&snap);

        // Late joiner is primed with the latest snapshot
        let (_b, mut rx_b) = broadcaster.subscribe();
        assert!(rx_b.try_recv().is_ok());

        // Same snapshot again: neither receives a duplicate
        let report = broadcaster.publish(&snap);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.unchanged, 2);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_first_publish_unconditional() {
        let broadcaster = PriceBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();
        assert!(rx.try_recv().is_err());

        assert_eq!(broadcaster.publish(&snapshot(dec!(50000))).delivered, 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_closed_receiver_removed() {
        let broadcaster = PriceBroadcaster::new();
        let (_id, rx) = broadcaster.subscribe();
        drop(rx);

        let report = broadcaster.publish(&snapshot(dec!(50000)));
        assert_eq!(report.dropped, 1);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_discards_state() {
        let broadcaster = PriceBroadcaster::new();
        let (id, _rx) = broadcaster.subscribe();
        broadcaster.unsubscribe(id);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.publish(&snapshot(dec!(1))).delivered, 0);
    }

    #[test]
    fn test_lagging_subscriber_not_advanced() {
        let broadcaster = PriceBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();

        for i in 0..SUBSCRIBER_BUFFER {
            broadcaster.publish(&snapshot(Decimal::from(50000 + i as u64)));
        }
        let report = broadcaster.publish(&snapshot(dec!(1)));
        assert_eq!(report.lagging, 1);

        // Once drained, the pending change is delivered on the next publish
        while rx.try_recv().is_ok() {}
        assert_eq!(broadcaster.publish(&snapshot(dec!(1))).delivered, 1);
    }

    #[test]
    fn test_concurrent_joiners_end_on_latest_snapshot() {
        const PUBLISHES: usize = 20;
        const JOINERS: usize = 8;
        assert!(PUBLISHES < SUBSCRIBER_BUFFER);

        for _ in 0..50 {
            let broadcaster = PriceBroadcaster::new();

            let receivers = std::thread::scope(|scope| {
                let joiners: Vec<_> = (0..JOINERS)
                    .map(|_| scope.spawn(|| broadcaster.subscribe().1))
                    .collect();
                scope.spawn(|| {
                    for i in 1..=PUBLISHES {
                        broadcaster.publish(&snapshot(Decimal::from(50000 + i as u64)));
                    }
                });
                joiners
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .collect::<Vec<_>>()
            });

            let last_price = 50000.0 + PUBLISHES as f64;
            for mut rx in receivers {
                let mut last = None;
                while let Ok(update) = rx.try_recv() {
                    last = Some(update.0[&Instrument::Bitcoin]);
                }
                assert_eq!(last, Some(last_price));
            }
        }
    }

    #[test]
    fn test_empty_snapshot_ignored() {
        let broadcaster = PriceBroadcaster::new();
        let (_id, mut rx) = broadcaster.subscribe();
        let report = broadcaster.publish(&PriceSnapshot::empty(Utc::now()));
        assert_eq!(report, PublishReport::default());
        assert!(rx.try_recv().is_err());
        assert!(broadcaster.latest().is_none());
    }
}
