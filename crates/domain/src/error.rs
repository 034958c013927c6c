//! Domain error types.

use common::AggregateId;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;

/// A command was rejected by an aggregate's business rules.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Errors returned at the command boundary.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The aggregate refused the command. Never retried.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The addressed aggregate has no events.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// Another writer appended to the stream first.
    #[error(
        "Concurrency conflict for {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The event store did not answer in time or could not be reached.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// Any other event store failure.
    #[error("Event store error: {0}")]
    Store(#[source] EventStoreError),

    /// A stored payload could not be decoded into a domain event.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// True when the same command may succeed if issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::ConcurrencyConflict { .. } | DomainError::Unavailable(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DomainError::Validation(_))
    }
}

impl From<EventStoreError> for DomainError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            },
            EventStoreError::UnknownStream(aggregate_id) => DomainError::NotFound {
                aggregate_type: "Stream",
                aggregate_id,
            },
            EventStoreError::Unavailable(message) => DomainError::Unavailable(message),
            EventStoreError::Serialization(err) => DomainError::Serialization(err),
            other => DomainError::Store(other),
        }
    }
}

impl From<OrderError> for DomainError {
    fn from(err: OrderError) -> Self {
        DomainError::Validation(err.into())
    }
}

impl From<CartError> for DomainError {
    fn from(err: CartError) -> Self {
        DomainError::Validation(err.into())
    }
}
