//! Loading aggregates by replay and saving their new events.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::config::HandlerConfig;
use crate::error::DomainError;

/// An aggregate together with the stream version it was rebuilt at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: Version,
}

impl<A: Aggregate> Loaded<A> {
    /// A not-yet-created aggregate, for creation commands.
    pub fn new_aggregate() -> Self {
        Self {
            aggregate: A::default(),
            version: Version::initial(),
        }
    }
}

/// Event-sourced repository for one aggregate kind.
///
/// Every store call is bounded by the configured timeout; expiry surfaces as
/// [`DomainError::Unavailable`].
pub struct Repository<S, A> {
    store: S,
    store_timeout: Duration,
    _phantom: PhantomData<A>,
}

impl<S, A> Repository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self::with_timeout(store, HandlerConfig::default().store_timeout)
    }

    pub fn with_timeout(store: S, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
            _phantom: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds the aggregate from its stream.
    ///
    /// Fails with `NotFound` if the stream has no events.
    pub async fn load(&self, id: AggregateId) -> Result<Loaded<A>, DomainError> {
        self.load_existing(id)
            .await?
            .ok_or(DomainError::NotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id,
            })
    }

    /// Like [`load`](Self::load), but yields a default aggregate at version 0
    /// for a missing stream.
    pub async fn load_or_default(&self, id: AggregateId) -> Result<Loaded<A>, DomainError> {
        Ok(self
            .load_existing(id)
            .await?
            .unwrap_or_else(Loaded::new_aggregate))
    }

    /// Rebuilds the aggregate, returning None if the stream is empty or
    /// belongs to another aggregate kind.
    pub async fn load_existing(&self, id: AggregateId) -> Result<Option<Loaded<A>>, DomainError> {
        let envelopes = self.bounded("read_stream", self.store.read_stream(id)).await?;
        Self::rehydrate(envelopes)
    }

    /// Folds stored envelopes into an aggregate.
    pub fn rehydrate(envelopes: Vec<EventEnvelope>) -> Result<Option<Loaded<A>>, DomainError> {
        let Some(first) = envelopes.first() else {
            return Ok(None);
        };
        if first.aggregate_type != A::aggregate_type() {
            tracing::debug!(
                aggregate_id = %first.aggregate_id,
                found = %first.aggregate_type,
                wanted = A::aggregate_type(),
                "stream belongs to another aggregate type"
            );
            return Ok(None);
        }

        let mut aggregate = A::default();
        let mut version = Version::initial();
        for envelope in envelopes {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            version = envelope.version;
        }
        aggregate.set_version(version);

        Ok(Some(Loaded { aggregate, version }))
    }

    /// Appends `events` after `expected_version`, returning the new version.
    ///
    /// A stale `expected_version` comes back as `ConcurrencyConflict`.
    #[tracing::instrument(skip(self, events), fields(aggregate_type = A::aggregate_type(), count = events.len()))]
    pub async fn save(
        &self,
        id: AggregateId,
        expected_version: Version,
        events: &[A::Event],
    ) -> Result<Version, DomainError> {
        if events.is_empty() {
            return Ok(expected_version);
        }

        let envelopes = Self::envelopes(id, expected_version, events)?;
        self.bounded("append", self.store.append(id, expected_version, envelopes))
            .await
    }

    fn envelopes(
        id: AggregateId,
        expected_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut version = expected_version;
        events
            .iter()
            .map(|event| -> Result<EventEnvelope, DomainError> {
                version = version.next();
                Ok(EventEnvelope::builder()
                    .aggregate_id(id)
                    .aggregate_type(A::aggregate_type())
                    .event_type(event.event_type())
                    .version(version)
                    .payload(event)?
                    .build()?)
            })
            .collect()
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, DomainError>
    where
        F: Future<Output = event_store::Result<T>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "event store call timed out"
                );
                Err(DomainError::Unavailable(format!(
                    "{operation} timed out after {}ms",
                    self.store_timeout.as_millis()
                )))
            }
        }
    }
}
