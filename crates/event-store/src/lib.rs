//! Event stream storage for the order/cart event-sourcing workspace.
//!
//! - [`EventEnvelope`]: an immutable, versioned fact belonging to one stream
//! - [`EventStore`]: append-only per-stream log with optimistic concurrency
//! - [`InMemoryEventStore`] and [`PostgresEventStore`] implementations
//! - [`EventDispatcher`] and [`DispatchingEventStore`]: post-commit delivery
//!   of appended events to subscribers

pub mod dispatch;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use dispatch::{
    DeadLetter, DispatcherConfig, DispatchingEventStore, EventDispatcher, EventFilter,
    EventSubscriber, SubscriberError,
};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreExt, EventStream, validate_batch};
