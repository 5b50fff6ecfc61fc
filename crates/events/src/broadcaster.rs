use {
    crate::Event,
    dashmap::DashMap,
    primitive_types::{H160, H256, U256},
    prometheus::IntCounter,
    std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc, OnceLock,
        },
        time::{Duration, Instant},
    },
    tokio::sync::mpsc,
};

pub type SubscriptionId = u64;

/// Liveness policy for the heartbeat sweep.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    /// Subscribers whose last heartbeat is older than this are dropped.
    pub heartbeat_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for Liveness {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// A live subscription handle. Dropping the receiver ends the subscription;
/// the subscriber is evicted on the next delivery attempt.
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<Event>,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum Topic {
    Book(H256, U256),
    Balance(H160),
    Settlement,
    /// Free-form channels for collaborating domains (keyed by an opaque
    /// scope id); they ride the same delivery and liveness machinery.
    Scope(String),
}

struct Subscriber {
    topic: Topic,
    sender: mpsc::UnboundedSender<Event>,
}

/// Result of one delivery attempt to one subscriber. A failed send means
/// the receiving side is gone; that is an eviction, not a logic error.
enum Delivery {
    Sent,
    Evicted,
}

/// Fan-out of [`Event`]s over three namespaces (per book, per user,
/// settlement wide) plus scoped channels. Events within one channel arrive
/// in emission order; nothing is guaranteed across channels.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: DashMap<SubscriptionId, Subscriber>,
    heartbeats: DashMap<SubscriptionId, Instant>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_orderbook(&self, market_id: H256, token_id: U256) -> Subscription {
        self.subscribe(Topic::Book(market_id, token_id))
    }

    pub fn subscribe_balance(&self, user: H160) -> Subscription {
        self.subscribe(Topic::Balance(user))
    }

    pub fn subscribe_settlement(&self) -> Subscription {
        self.subscribe(Topic::Settlement)
    }

    pub fn subscribe_scope(&self, scope: impl Into<String>) -> Subscription {
        self.subscribe(Topic::Scope(scope.into()))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(&id);
        self.heartbeats.remove(&id);
    }

    /// Refreshes the subscriber's liveness; `false` if it is already gone.
    pub fn heartbeat(&self, id: SubscriptionId) -> bool {
        if !self.subscribers.contains_key(&id) {
            return false;
        }
        self.heartbeats.insert(id, Instant::now());
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish_orderbook(&self, market_id: H256, token_id: U256, event: Event) {
        self.publish(&Topic::Book(market_id, token_id), event);
    }

    pub fn publish_balance(&self, user: H160, event: Event) {
        self.publish(&Topic::Balance(user), event);
    }

    pub fn publish_settlement(&self, event: Event) {
        self.publish(&Topic::Settlement, event);
    }

    pub fn publish_scope(&self, scope: &str, event: Event) {
        self.publish(&Topic::Scope(scope.to_string()), event);
    }

    fn subscribe(&self, topic: Topic) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, events) = mpsc::unbounded_channel();
        self.subscribers.insert(id, Subscriber { topic, sender });
        self.heartbeats.insert(id, Instant::now());
        Subscription { id, events }
    }

    fn publish(&self, topic: &Topic, event: Event) {
        // Failed ids are collected first; removing from a dashmap while
        // iterating it can deadlock on the shard lock.
        let mut evicted = Vec::new();
        for subscriber in self.subscribers.iter() {
            if subscriber.topic != *topic {
                continue;
            }
            match deliver(&subscriber.sender, &event) {
                Delivery::Sent => {}
                Delivery::Evicted => evicted.push(*subscriber.key()),
            }
        }
        for id in evicted {
            tracing::debug!(subscription = id, "evicting unreachable subscriber");
            evicted_counter().inc();
            self.unsubscribe(id);
        }
    }

    /// Drops every subscriber whose heartbeat is older than `max_age`;
    /// returns how many were dropped.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<SubscriptionId> = self
            .heartbeats
            .iter()
            .filter(|entry| entry.value().elapsed() > max_age)
            .map(|entry| *entry.key())
            .collect();
        for id in &stale {
            tracing::debug!(subscription = id, "dropping stale subscriber");
            self.unsubscribe(*id);
        }
        stale.len()
    }
}

/// Periodic sweep task owned by whoever wired the broadcaster up. Stopping
/// the handle stops the sweeping, not the broadcaster.
pub struct SweepHandle {
    task: tokio::task::JoinHandle<()>,
}

impl SweepHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

pub fn spawn_sweeper(broadcaster: Arc<Broadcaster>, liveness: Liveness) -> SweepHandle {
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(liveness.sweep_interval);
        loop {
            interval.tick().await;
            let dropped = broadcaster.sweep_stale(liveness.heartbeat_timeout);
            if dropped > 0 {
                tracing::info!(dropped, "swept stale subscribers");
            }
        }
    });
    SweepHandle { task }
}

fn deliver(sender: &mpsc::UnboundedSender<Event>, event: &Event) -> Delivery {
    match sender.send(event.clone()) {
        Ok(()) => Delivery::Sent,
        Err(_) => Delivery::Evicted,
    }
}

fn evicted_counter() -> &'static IntCounter {
    static COUNTER: OnceLock<IntCounter> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let counter = IntCounter::new(
            "broadcaster_evicted_subscribers",
            "Subscribers dropped because event delivery failed",
        )
        .unwrap();
        observe::metrics::get_registry()
            .register(Box::new(counter.clone()))
            .unwrap();
        counter
    })
}
