use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{EventStore, EventStream, validate_batch},
};

/// Events of one stream, each tagged with its global commit sequence.
type StreamLog = Arc<Mutex<Vec<(u64, EventEnvelope)>>>;

/// In-memory event store.
///
/// Each stream has its own lock, so concurrent appends are serialized per
/// stream and never across unrelated streams. The outer map lock is held only
/// long enough to look up or register a stream.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<AggregateId, StreamLog>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored across all streams.
    pub async fn event_count(&self) -> usize {
        let streams: Vec<StreamLog> = self.streams.read().await.values().cloned().collect();
        let mut count = 0;
        for stream in streams {
            count += stream.lock().await.len();
        }
        count
    }

    async fn existing_stream(&self, stream_id: AggregateId) -> Option<StreamLog> {
        self.streams.read().await.get(&stream_id).cloned()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, events), fields(batch = events.len()))]
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_batch(stream_id, expected_version, &events)?;

        let stream = if expected_version.is_initial() {
            self.streams
                .write()
                .await
                .entry(stream_id)
                .or_default()
                .clone()
        } else {
            self.existing_stream(stream_id)
                .await
                .ok_or(EventStoreError::UnknownStream(stream_id))?
        };

        let mut log = stream.lock().await;
        let actual = log
            .last()
            .map(|(_, event)| event.version)
            .unwrap_or(Version::initial());

        if actual != expected_version {
            if actual.is_initial() {
                return Err(EventStoreError::UnknownStream(stream_id));
            }
            metrics::counter!("event_store_append_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id: stream_id,
                expected: expected_version,
                actual,
            });
        }

        let new_version = expected_version.advance(events.len());
        metrics::counter!("event_store_events_appended_total").increment(events.len() as u64);
        for event in events {
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            log.push((sequence, event));
        }

        Ok(new_version)
    }

    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.read_stream_from(stream_id, Version::first()).await
    }

    async fn read_stream_from(
        &self,
        stream_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let Some(stream) = self.existing_stream(stream_id).await else {
            return Ok(Vec::new());
        };
        let log = stream.lock().await;
        Ok(log
            .iter()
            .filter(|(_, event)| event.version >= from_version)
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>> {
        let Some(stream) = self.existing_stream(stream_id).await else {
            return Ok(None);
        };
        let log = stream.lock().await;
        Ok(log.last().map(|(_, event)| event.version))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let streams: Vec<StreamLog> = self.streams.read().await.values().cloned().collect();
        let mut all = Vec::new();
        for stream in streams {
            all.extend(stream.lock().await.iter().cloned());
        }
        all.sort_by_key(|(sequence, _)| *sequence);

        let stream = stream::iter(all.into_iter().map(|(_, event)| Ok(event)));
        Ok(Box::pin(stream))
    }
}
