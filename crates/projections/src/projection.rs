//! Core projection trait, position tracking and the dispatcher adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use event_store::{EventEnvelope, EventSubscriber, SubscriberError, Version};

use crate::Result;

/// Tracks how many events a projection has applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of events applied by this projection. Skipped redeliveries
    /// and events of other aggregate types are not counted.
    pub events_processed: u64,
}

impl ProjectionPosition {
    /// Creates a new position at zero.
    pub fn zero() -> Self {
        Self {
            events_processed: 0,
        }
    }

    /// Advances the position by one event.
    pub fn advance(&self) -> Self {
        Self {
            events_processed: self.events_processed + 1,
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// What a view should do with a delivery, given what it has applied so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The delivery is the next version of its stream.
    Apply,
    /// The delivery was applied before.
    Duplicate,
    /// An earlier version of the stream has not been applied yet.
    Gap { expected: Version },
}

/// Last version applied for each stream.
///
/// Versions must be applied one by one starting at 1. Anything at or below
/// the last recorded version is a duplicate, anything past the next one is a
/// gap.
#[derive(Debug, Clone, Default)]
pub struct AppliedVersions(HashMap<AggregateId, Version>);

impl AppliedVersions {
    pub fn admit(&self, event: &EventEnvelope) -> Admission {
        let expected = self
            .last(event.aggregate_id)
            .map_or_else(Version::first, |last| last.next());
        if event.version == expected {
            Admission::Apply
        } else if event.version < expected {
            Admission::Duplicate
        } else {
            Admission::Gap { expected }
        }
    }

    pub fn record(&mut self, event: &EventEnvelope) {
        self.0.insert(event.aggregate_id, event.version);
    }

    pub fn last(&self, stream_id: AggregateId) -> Option<Version> {
        self.0.get(&stream_id).copied()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// A projection that processes events and updates a read model.
///
/// `handle` must be idempotent: the dispatcher delivers at least once and a
/// rebuild replays the whole store.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Returns the current position of this projection.
    async fn position(&self) -> ProjectionPosition;

    /// Resets the projection to its initial state.
    async fn reset(&self) -> Result<()>;
}

/// Feeds dispatched events into a [`Projection`].
pub struct ProjectionSubscriber {
    projection: Arc<dyn Projection>,
}

impl ProjectionSubscriber {
    pub fn new(projection: Arc<dyn Projection>) -> Self {
        Self { projection }
    }
}

#[async_trait]
impl EventSubscriber for ProjectionSubscriber {
    async fn handle(&self, event: &EventEnvelope) -> std::result::Result<(), SubscriberError> {
        self.projection.handle(event).await.map_err(|err| {
            tracing::warn!(
                projection = self.projection.name(),
                event_type = %event.event_type,
                error = %err,
                "projection rejected event"
            );
            SubscriberError::from(err)
        })
    }
}
