use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// A stream of events in global commit order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only, per-stream ordered event log.
///
/// Implementations must be thread-safe and must serialize appends per stream
/// only; appends to unrelated streams never wait on each other.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` to `stream_id` after `expected_version`, atomically.
    ///
    /// - `expected_version == 0` creates the stream; it fails with
    ///   `ConcurrencyConflict` if the stream already has events.
    /// - `expected_version > 0` fails with `UnknownStream` if the stream does
    ///   not exist and with `ConcurrencyConflict` if its current version
    ///   differs.
    ///
    /// Either every event is stored or none is. Returns the new stream version.
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version>;

    /// Reads a whole stream in version order.
    ///
    /// A missing stream yields an empty vector, not an error.
    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Reads a stream starting at `from_version` (inclusive).
    async fn read_stream_from(
        &self,
        stream_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Current version of a stream, or `None` if it does not exist.
    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>>;

    /// Streams every stored event in global commit order.
    async fn stream_all_events(&self) -> Result<EventStream>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event.
    async fn append_event(
        &self,
        stream_id: AggregateId,
        expected_version: Version,
        event: EventEnvelope,
    ) -> Result<Version> {
        self.append(stream_id, expected_version, vec![event]).await
    }

    /// Checks whether a stream has any events.
    async fn stream_exists(&self, stream_id: AggregateId) -> Result<bool> {
        Ok(self.stream_version(stream_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch can be appended to `stream_id` at `expected_version`.
///
/// The batch must be non-empty, belong entirely to `stream_id`, share one
/// aggregate type and carry versions `expected + 1, expected + 2, ...`.
pub fn validate_batch(
    stream_id: AggregateId,
    expected_version: Version,
    events: &[EventEnvelope],
) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut version = expected_version;
    for event in events {
        if event.aggregate_id != stream_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "event {} belongs to stream {}, not {stream_id}",
                event.event_id, event.aggregate_id
            )));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(
                "all events must have the same aggregate type".to_string(),
            ));
        }
        version = version.next();
        if event.version != version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be contiguous: expected {version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
