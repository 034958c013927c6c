//! Command handling infrastructure.

use std::time::Instant;

use common::AggregateId;
use event_store::{EventStore, Version};

use crate::aggregate::Aggregate;
use crate::config::HandlerConfig;
use crate::error::DomainError;
use crate::repository::{Loaded, Repository};

/// Which stream a command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    /// Creates a new aggregate; the handler mints its id.
    New,
    Existing(AggregateId),
}

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    fn target(&self) -> CommandTarget;

    /// Validates the command against the current state and returns the
    /// resulting events. Must not have side effects: it may run several
    /// times when the handler retries after a conflict.
    fn decide(
        &self,
        id: AggregateId,
        aggregate: &Self::Aggregate,
    ) -> Result<Vec<<Self::Aggregate as Aggregate>::Event>, <Self::Aggregate as Aggregate>::Error>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    pub aggregate_id: AggregateId,

    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The stream version after the command. Unchanged when no events were produced.
    pub new_version: Version,
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate by replaying its stream
/// 2. Executing the command to produce events
/// 3. Appending the events with the loaded version as the expected version
/// 4. Reloading and deciding again when another writer got there first
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    repository: Repository<S, A>,
    max_attempts: u32,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    /// Creates a new command handler with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, HandlerConfig::default())
    }

    pub fn with_config(store: S, config: HandlerConfig) -> Self {
        Self {
            repository: Repository::with_timeout(store, config.store_timeout),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn repository(&self) -> &Repository<S, A> {
        &self.repository
    }

    /// Executes a command and persists the resulting events.
    ///
    /// Creation commands run once; a conflict means the freshly minted stream
    /// already exists and is returned as an error. Update commands are retried on
    /// conflict up to the configured number of attempts. Validation and
    /// not-found errors are never retried.
    #[tracing::instrument(skip(self, command), fields(aggregate_type = A::aggregate_type()))]
    pub async fn handle<C>(&self, command: C) -> Result<CommandResult<A>, DomainError>
    where
        C: Command<Aggregate = A>,
    {
        let started = Instant::now();

        let result = match command.target() {
            CommandTarget::New => {
                self.decide_and_save(AggregateId::new(), Loaded::new_aggregate(), &command)
                    .await
            }
            CommandTarget::Existing(id) => self.handle_existing(id, &command).await,
        };

        let outcome = match &result {
            Ok(_) => "accepted",
            Err(err) if err.is_validation() => "rejected",
            Err(_) => "failed",
        };
        metrics::counter!(
            "commands_handled_total",
            "aggregate_type" => A::aggregate_type(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("command_duration_seconds", "aggregate_type" => A::aggregate_type())
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn handle_existing<C>(
        &self,
        id: AggregateId,
        command: &C,
    ) -> Result<CommandResult<A>, DomainError>
    where
        C: Command<Aggregate = A>,
    {
        let mut attempt = 1;
        loop {
            let loaded = self.repository.load(id).await?;
            match self.decide_and_save(id, loaded, command).await {
                Err(err @ DomainError::ConcurrencyConflict { .. }) if attempt < self.max_attempts => {
                    tracing::warn!(aggregate_id = %id, attempt, error = %err, "conflict, reloading");
                    metrics::counter!("command_retries_total", "aggregate_type" => A::aggregate_type())
                        .increment(1);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn decide_and_save<C>(
        &self,
        id: AggregateId,
        loaded: Loaded<A>,
        command: &C,
    ) -> Result<CommandResult<A>, DomainError>
    where
        C: Command<Aggregate = A>,
    {
        let Loaded {
            mut aggregate,
            version,
        } = loaded;

        let events = command.decide(id, &aggregate)?;
        if events.is_empty() {
            return Ok(CommandResult {
                aggregate_id: id,
                aggregate,
                events,
                new_version: version,
            });
        }

        let new_version = self.repository.save(id, version, &events).await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate_id: id,
            aggregate,
            events,
            new_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use event_store::{EventEnvelope, EventStream, InMemoryEventStore};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::aggregate::DomainEvent;
    use crate::order::OrderError;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum CounterEvent {
        Opened { id: AggregateId },
        Incremented { by: u32 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened { .. } => "CounterOpened",
                CounterEvent::Incremented { .. } => "CounterIncremented",
            }
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Counter {
        id: Option<AggregateId>,
        value: u32,
        version: Version,
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Error = OrderError;

        fn aggregate_type() -> &'static str {
            "Counter"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                CounterEvent::Opened { id } => self.id = Some(id),
                CounterEvent::Incremented { by } => self.value += by,
            }
        }
    }

    struct Open;

    impl Command for Open {
        type Aggregate = Counter;

        fn target(&self) -> CommandTarget {
            CommandTarget::New
        }

        fn decide(&self, id: AggregateId, _counter: &Counter) -> Result<Vec<CounterEvent>, OrderError> {
            Ok(vec![CounterEvent::Opened { id }])
        }
    }

    /// Increments by `by`; zero is a no-op and values above 100 are rejected.
    struct Increment {
        id: AggregateId,
        by: u32,
    }

    impl Command for Increment {
        type Aggregate = Counter;

        fn target(&self) -> CommandTarget {
            CommandTarget::Existing(self.id)
        }

        fn decide(&self, _id: AggregateId, _counter: &Counter) -> Result<Vec<CounterEvent>, OrderError> {
            match self.by {
                0 => Ok(vec![]),
                by if by > 100 => Err(OrderError::InvalidQuantity { quantity: by }),
                by => Ok(vec![CounterEvent::Incremented { by }]),
            }
        }
    }

    /// Lets a rival writer append to the stream right before each of the
    /// first `races` appends, so those appends hit a stale version.
    #[derive(Clone)]
    struct RacingStore {
        inner: InMemoryEventStore,
        races: Arc<AtomicU32>,
        rival_writes: Arc<AtomicU32>,
    }

    impl RacingStore {
        fn new(inner: InMemoryEventStore, races: u32) -> Self {
            Self {
                inner,
                races: Arc::new(AtomicU32::new(races)),
                rival_writes: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl EventStore for RacingStore {
        async fn append(
            &self,
            stream_id: AggregateId,
            expected_version: Version,
            events: Vec<EventEnvelope>,
        ) -> event_store::Result<Version> {
            if self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                let rival = EventEnvelope::builder()
                    .aggregate_id(stream_id)
                    .aggregate_type("Counter")
                    .event_type("CounterIncremented")
                    .version(expected_version.next())
                    .payload(&CounterEvent::Incremented { by: 1 })?
                    .build()?;
                self.inner.append(stream_id, expected_version, vec![rival]).await?;
                self.rival_writes.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.append(stream_id, expected_version, events).await
        }

        async fn read_stream(&self, stream_id: AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.read_stream(stream_id).await
        }

        async fn read_stream_from(
            &self,
            stream_id: AggregateId,
            from_version: Version,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.read_stream_from(stream_id, from_version).await
        }

        async fn stream_version(&self, stream_id: AggregateId) -> event_store::Result<Option<Version>> {
            self.inner.stream_version(stream_id).await
        }

        async fn stream_all_events(&self) -> event_store::Result<EventStream> {
            self.inner.stream_all_events().await
        }
    }

    async fn opened(handler: &CommandHandler<impl EventStore, Counter>) -> AggregateId {
        handler.handle(Open).await.unwrap().aggregate_id
    }

    #[tokio::test]
    async fn creation_mints_id_and_starts_stream() {
        let handler: CommandHandler<_, Counter> = CommandHandler::new(InMemoryEventStore::new());

        let result = handler.handle(Open).await.unwrap();

        assert!(!result.aggregate_id.is_nil());
        assert_eq!(result.aggregate.id(), Some(result.aggregate_id));
        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.events.len(), 1);
    }

    #[tokio::test]
    async fn update_appends_after_loaded_version() {
        let handler: CommandHandler<_, Counter> = CommandHandler::new(InMemoryEventStore::new());
        let id = opened(&handler).await;

        let result = handler.handle(Increment { id, by: 5 }).await.unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.value, 5);
        assert_eq!(result.aggregate.version(), Version::new(2));
    }

    #[tokio::test]
    async fn update_of_missing_aggregate_is_not_found() {
        let handler: CommandHandler<_, Counter> = CommandHandler::new(InMemoryEventStore::new());

        let result = handler
            .handle(Increment {
                id: AggregateId::new(),
                by: 1,
            })
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { aggregate_type: "Counter", .. })));
    }

    #[tokio::test]
    async fn rejected_command_appends_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Counter> = CommandHandler::new(store.clone());
        let id = opened(&handler).await;

        let result = handler.handle(Increment { id, by: 500 }).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(store.stream_version(id).await.unwrap(), Some(Version::first()));
    }

    #[tokio::test]
    async fn empty_decision_returns_without_persisting() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Counter> = CommandHandler::new(store.clone());
        let id = opened(&handler).await;

        let result = handler.handle(Increment { id, by: 0 }).await.unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::first());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn conflict_is_retried_against_fresh_state() {
        let inner = InMemoryEventStore::new();
        let setup: CommandHandler<_, Counter> = CommandHandler::new(inner.clone());
        let id = opened(&setup).await;

        let racing = RacingStore::new(inner.clone(), 1);
        let handler: CommandHandler<_, Counter> = CommandHandler::new(racing.clone());

        let result = handler.handle(Increment { id, by: 10 }).await.unwrap();

        assert_eq!(racing.rival_writes.load(Ordering::SeqCst), 1);
        assert_eq!(result.new_version, Version::new(3));
        assert_eq!(result.aggregate.value, 11);
    }

    #[tokio::test]
    async fn conflict_surfaces_after_max_attempts() {
        let inner = InMemoryEventStore::new();
        let setup: CommandHandler<_, Counter> = CommandHandler::new(inner.clone());
        let id = opened(&setup).await;

        let racing = RacingStore::new(inner.clone(), u32::MAX);
        let handler: CommandHandler<_, Counter> = CommandHandler::with_config(
            racing.clone(),
            HandlerConfig::default().with_max_attempts(2),
        );

        let result = handler.handle(Increment { id, by: 10 }).await;

        assert!(matches!(result, Err(DomainError::ConcurrencyConflict { .. })));
        assert_eq!(racing.rival_writes.load(Ordering::SeqCst), 2);
        // Only the rival writes landed.
        assert_eq!(inner.stream_version(id).await.unwrap(), Some(Version::new(3)));
    }
}
