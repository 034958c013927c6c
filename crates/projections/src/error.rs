//! Projection error types.

use common::AggregateId;
use event_store::{SubscriberError, Version};
use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An event arrived for an entity the view has never seen created.
    #[error("{view}: no entry for {aggregate_id} at version {version}")]
    MissingEntry {
        view: &'static str,
        aggregate_id: AggregateId,
        version: Version,
    },

    /// An event arrived before an earlier event of its stream was applied.
    #[error("{view}: {aggregate_id} expected version {expected}, got {found}")]
    OutOfOrder {
        view: &'static str,
        aggregate_id: AggregateId,
        expected: Version,
        found: Version,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

impl From<ProjectionError> for SubscriberError {
    fn from(err: ProjectionError) -> Self {
        SubscriberError::new(err.to_string())
    }
}
