use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Version,
    store::{EventStore, EventStream, validate_batch},
};

const SELECT_EVENTS: &str = r#"
    SELECT id, event_type, aggregate_id, aggregate_type, version, occurred_at, payload, metadata
    FROM events
"#;

/// PostgreSQL-backed event store.
///
/// The `unique_aggregate_version` constraint is the final arbiter between
/// concurrent writers to one stream; unrelated streams never contend.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata").map_err(classify)?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id").map_err(classify)?),
            event_type: row.try_get("event_type").map_err(classify)?,
            aggregate_id: AggregateId::from_uuid(
                row.try_get::<Uuid, _>("aggregate_id").map_err(classify)?,
            ),
            aggregate_type: row.try_get("aggregate_type").map_err(classify)?,
            version: Version::new(row.try_get("version").map_err(classify)?),
            occurred_at: row.try_get("occurred_at").map_err(classify)?,
            payload: row.try_get("payload").map_err(classify)?,
            metadata,
        })
    }

    async fn current_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        stream_id: AggregateId,
    ) -> Result<Version> {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_one(&mut **tx)
                .await
                .map_err(classify)?;
        Ok(Version::new(current.unwrap_or(0)))
    }
}

/// Splits driver errors into outages (retryable) and everything else.
fn classify(error: sqlx::Error) -> EventStoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            EventStoreError::Unavailable(error.to_string())
        }
        other => EventStoreError::Database(other),
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(batch = events.len()))]
    async fn append(
        &self,
        stream_id: AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> Result<Version> {
        validate_batch(stream_id, expected_version, &events)?;

        let mut tx = self.pool.begin().await.map_err(classify)?;

        let actual = Self::current_version(&mut tx, stream_id).await?;
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

        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, occurred_at, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.occurred_at)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer committed the same version first.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    metrics::counter!("event_store_append_conflicts_total").increment(1);
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id: stream_id,
                        expected: expected_version,
                        actual: event.version,
                    };
                }
                classify(e)
            })?;
        }

        tx.commit().await.map_err(classify)?;

        metrics::counter!("event_store_events_appended_total").increment(events.len() as u64);
        Ok(expected_version.advance(events.len()))
    }

    async fn read_stream(&self, stream_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.read_stream_from(stream_id, Version::first()).await
    }

    async fn read_stream_from(
        &self,
        stream_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!("{SELECT_EVENTS} WHERE aggregate_id = $1 AND version >= $2 ORDER BY version ASC");
        let rows = sqlx::query(&sql)
            .bind(stream_id.as_uuid())
            .bind(from_version.as_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, stream_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(classify)?;

        Ok(version.map(Version::new))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let sql = format!("{SELECT_EVENTS} ORDER BY global_position ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;

        let stream = futures_util::stream::iter(rows).map(Self::row_to_event);
        Ok(Box::pin(stream))
    }
}
