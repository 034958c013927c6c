//! Projection processor for feeding events to projections.

use std::sync::Arc;

use event_store::{EventDispatcher, EventEnvelope, EventFilter, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::{Projection, ProjectionSubscriber};

/// Delivers stored and live events to a set of projections.
///
/// - Catch-up: replays every stored event; projections skip what they have
///   already applied
/// - Live: [`subscribe_to`](Self::subscribe_to) registers each projection
///   with the dispatcher
/// - Rebuild: resets all projections and replays from scratch
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Arc<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Arc<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Subscribes every registered projection to `dispatcher` under its own
    /// name, so a failing projection only parks its own deliveries.
    pub async fn subscribe_to(&self, dispatcher: &EventDispatcher) {
        for projection in &self.projections {
            dispatcher
                .subscribe(
                    projection.name(),
                    EventFilter::All,
                    Arc::new(ProjectionSubscriber::new(Arc::clone(projection))),
                )
                .await;
        }
    }

    /// Streams all stored events, in commit order, to every projection.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all_events().await?;
        let mut events_read: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            events_read += 1;
            self.process_event(&event).await?;
        }

        tracing::info!(events_read, "catch-up complete");

        Ok(events_read)
    }

    /// Delivers a single event to all registered projections.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
            metrics::counter!("projections_events_processed", "projection" => projection.name())
                .increment(1);
        }
        Ok(())
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}
