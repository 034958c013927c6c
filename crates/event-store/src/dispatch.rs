//! Post-commit delivery of appended events to subscribers.
//!
//! Delivery is at-least-once and ordered per stream. A subscriber that keeps
//! failing never affects the append that produced the events: the failed
//! delivery is parked as a [`DeadLetter`], and later events of the same stream
//! for that subscriber queue up behind it until
//! [`EventDispatcher::redeliver_dead_letters`] drains them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::{
    AggregateId, EventEnvelope, Result, Version,
    store::{EventStore, EventStream},
};

/// Failure reported by a subscriber while handling one event.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SubscriberError(String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A consumer of committed events, such as a read-model projection.
///
/// Subscribers may see the same event more than once and must treat
/// `(aggregate_id, version)` as the identity of a delivery.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> std::result::Result<(), SubscriberError>;
}

/// Selects which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    All,
    EventTypes(Vec<String>),
    AggregateType(String),
}

impl EventFilter {
    pub fn event_types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        EventFilter::EventTypes(types.into_iter().map(Into::into).collect())
    }

    pub fn aggregate_type(aggregate_type: impl Into<String>) -> Self {
        EventFilter::AggregateType(aggregate_type.into())
    }

    pub fn matches(&self, event: &EventEnvelope) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.iter().any(|t| *t == event.event_type),
            EventFilter::AggregateType(aggregate_type) => *aggregate_type == event.aggregate_type,
        }
    }
}

/// Dispatcher tuning, read from the environment like the rest of the stack.
///
/// - `DISPATCH_MAX_ATTEMPTS`: delivery attempts per event and subscriber (default: `3`)
/// - `DISPATCH_RETRY_BACKOFF_MS`: pause between attempts (default: `10`)
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("DISPATCH_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_attempts),
            retry_backoff: std::env::var("DISPATCH_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

/// A delivery that exhausted its attempts, kept for later redelivery.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub subscriber: String,
    pub event: EventEnvelope,
    pub error: String,
}

impl DeadLetter {
    fn blocks(&self, subscriber: &str, stream_id: AggregateId) -> bool {
        self.subscriber == subscriber && self.event.aggregate_id == stream_id
    }
}

#[derive(Clone)]
struct Subscription {
    name: String,
    filter: EventFilter,
    subscriber: Arc<dyn EventSubscriber>,
}

/// In-process pub/sub for committed events.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    config: DispatcherConfig,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl EventDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Registers a subscriber under a unique name.
    pub async fn subscribe(
        &self,
        name: impl Into<String>,
        filter: EventFilter,
        subscriber: Arc<dyn EventSubscriber>,
    ) {
        let name = name.into();
        tracing::debug!(subscriber = %name, ?filter, "subscriber registered");
        self.subscriptions.write().await.push(Subscription {
            name,
            filter,
            subscriber,
        });
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Snapshot of the deliveries currently parked.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    /// Delivers `events`, in order, to every matching subscriber.
    ///
    /// Never fails: deliveries that exhaust their attempts are parked.
    #[tracing::instrument(skip(self, events), fields(batch = events.len()))]
    pub async fn dispatch(&self, events: &[EventEnvelope]) {
        let subscriptions = self.subscriptions.read().await.clone();

        for event in events {
            for subscription in subscriptions.iter().filter(|s| s.filter.matches(event)) {
                if self.is_blocked(&subscription.name, event.aggregate_id).await {
                    self.park(subscription, event, "queued behind an earlier failed delivery")
                        .await;
                    continue;
                }
                if let Err(error) = self.deliver(subscription, event).await {
                    self.park(subscription, event, &error.to_string()).await;
                }
            }
        }
    }

    /// Retries every parked delivery in its original order.
    ///
    /// Returns the number of deliveries that succeeded. Deliveries that fail
    /// again, and those queued behind them, stay parked. The dead-letter queue
    /// stays locked for the whole pass, so a concurrent [`dispatch`] waits
    /// instead of overtaking a letter that is being redelivered.
    ///
    /// [`dispatch`]: EventDispatcher::dispatch
    pub async fn redeliver_dead_letters(&self) -> usize {
        let mut dead_letters = self.dead_letters.lock().await;
        if dead_letters.is_empty() {
            return 0;
        }

        let subscriptions = self.subscriptions.read().await.clone();
        let mut still_failing: Vec<DeadLetter> = Vec::new();
        let mut delivered = 0;

        for letter in dead_letters.drain(..) {
            let Some(subscription) = subscriptions.iter().find(|s| s.name == letter.subscriber)
            else {
                tracing::warn!(
                    subscriber = %letter.subscriber,
                    event_id = %letter.event.event_id,
                    "dropping dead letter for unknown subscriber"
                );
                continue;
            };

            let blocked = still_failing
                .iter()
                .any(|l| l.blocks(&letter.subscriber, letter.event.aggregate_id));
            if blocked {
                still_failing.push(letter);
                continue;
            }

            match self.deliver(subscription, &letter.event).await {
                Ok(()) => delivered += 1,
                Err(error) => still_failing.push(DeadLetter {
                    error: error.to_string(),
                    ..letter
                }),
            }
        }
        *dead_letters = still_failing;

        delivered
    }

    async fn deliver(
        &self,
        subscription: &Subscription,
        event: &EventEnvelope,
    ) -> std::result::Result<(), SubscriberError> {
        let mut attempt = 1;
        loop {
            match subscription.subscriber.handle(event).await {
                Ok(()) => {
                    metrics::counter!("dispatcher_deliveries_total").increment(1);
                    return Ok(());
                }
                Err(error) if attempt < self.config.max_attempts => {
                    tracing::warn!(
                        subscriber = %subscription.name,
                        event_type = %event.event_type,
                        attempt,
                        %error,
                        "delivery failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn is_blocked(&self, subscriber: &str, stream_id: AggregateId) -> bool {
        self.dead_letters
            .lock()
            .await
            .iter()
            .any(|letter| letter.blocks(subscriber, stream_id))
    }

    async fn park(&self, subscription: &Subscription, event: &EventEnvelope, error: &str) {
        tracing::error!(
            subscriber = %subscription.name,
            aggregate_id = %event.aggregate_id,
            version = %event.version,
            error,
            "delivery parked as dead letter"
        );
        metrics::counter!("dispatcher_dead_letters_total").increment(1);
        self.dead_letters.lock().await.push(DeadLetter {
            subscriber: subscription.name.clone(),
            event: event.clone(),
            error: error.to_string(),
        });
    }
}

/// Store decorator that dispatches every committed batch before returning.
///
/// The inner append is durable before any subscriber sees the events, and
/// subscriber failures never turn a successful append into an error.
///
/// Appends to one stream hold that stream's lock from the inner append until
/// dispatch finishes, so subscribers see each stream's batches in commit
/// order even when callers race.
#[derive(Clone)]
pub struct DispatchingEventStore<S> {
    inner: S,
    dispatcher: EventDispatcher,
    stream_locks: Arc<Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>>,
}

impl<S: EventStore> DispatchingEventStore<S> {
    pub fn new(inner: S, dispatcher: EventDispatcher) -> Self {
        Self {
            inner,
            dispatcher,
            stream_locks: Arc::default(),
        }
    }

    async fn stream_lock(&self, stream_id: AggregateId) -> Arc<Mutex<()>> {
        self.stream_locks
            .lock()
            .await
            .entry(stream_id)
            .or_default()
            .clone()
    }

    /// Drops the stream's lock entry once no other append holds or awaits it.
    async fn release_stream_lock(&self, stream_id: AggregateId, lock: Arc<Mutex<()>>) {
        let mut locks = self.stream_locks.lock().await;
        drop(lock);
        if locks
            .get(&stream_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&stream_id);
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

#[async_trait]
impl<S: EventStore> EventStore for DispatchingEventStore<S> {
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        let lock = self.stream_lock(stream_id).await;
        let result = {
            let _serialized = lock.lock().await;
            let committed = events.clone();
            let result = self.inner.append(stream_id, expected_version, events).await;
            if result.is_ok() {
                self.dispatcher.dispatch(&committed).await;
            }
            result
        };
        self.release_stream_lock(stream_id, lock).await;
        result
    }

    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.inner.read_stream(stream_id).await
    }

    async fn read_stream_from(
        &self,
        stream_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        self.inner.read_stream_from(stream_id, from_version).await
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>> {
        self.inner.stream_version(stream_id).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        self.inner.stream_all_events().await
    }
}
