use crate::domain::{events::DomainEvent, value_objects::LoanRequestId};
use crate::ports::event_store::{EventStore as EventStoreTrait, Result, StoreError};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row};

const AGGREGATE_TYPE: &str = "LoanRequest";

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

/// Append events to a request stream inside an open transaction
///
/// Checks the current stream version against `expected_version` first.
/// Two writers that both pass the check race on the
/// (aggregate_id, aggregate_version) unique key; the loser gets a
/// `VersionConflict` as well.
pub(super) async fn append_in_tx(
    conn: &mut PgConnection,
    request_id: LoanRequestId,
    expected_version: u32,
    events: &[DomainEvent],
) -> Result<()> {
    // COALESCE handles NULL when no events exist for this aggregate
    let current_version: i32 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(MAX(aggregate_version), 0)
        FROM events
        WHERE aggregate_id = $1
        "#,
    )
    .bind(request_id.value())
    .fetch_one(&mut *conn)
    .await
    .map_err(StoreError::backend)?;

    let conflict = |actual: i32| StoreError::VersionConflict {
        request_id,
        expected: expected_version,
        actual: actual.max(0) as u32,
    };

    if current_version != expected_version as i32 {
        return Err(conflict(current_version));
    }

    if events.is_empty() {
        return Ok(());
    }

    // Prepare batch data
    let mut versions = Vec::with_capacity(events.len());
    let mut event_types = Vec::with_capacity(events.len());
    let mut event_data_list = Vec::with_capacity(events.len());
    let mut occurred_at_list = Vec::with_capacity(events.len());

    for (i, event) in events.iter().enumerate() {
        versions.push(current_version + (i as i32) + 1);
        event_types.push(event.event_type());
        event_data_list.push(serde_json::to_value(event).map_err(StoreError::backend)?);
        occurred_at_list.push(event.occurred_at());
    }

    let aggregate_types = vec![AGGREGATE_TYPE; events.len()];

    // Batch INSERT using UNNEST
    let inserted = sqlx::query(
        r#"
        INSERT INTO events (
            aggregate_id,
            aggregate_version,
            aggregate_type,
            event_type,
            event_data,
            occurred_at
        )
        SELECT $1, * FROM UNNEST($2::int[], $3::varchar[], $4::varchar[], $5::jsonb[], $6::timestamptz[])
        "#,
    )
    .bind(request_id.value())
    .bind(&versions)
    .bind(&aggregate_types)
    .bind(&event_types)
    .bind(&event_data_list)
    .bind(&occurred_at_list)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(conflict(current_version + 1)),
        Err(err) => Err(StoreError::backend(err)),
    }
}

/// PostgreSQL implementation of EventStore
///
/// Stores domain events in an append-only event log.
/// Events are serialized as JSONB for flexible schema evolution.
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    /// Create a new EventStore with a PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStoreTrait for EventStore {
    /// Append events with an optimistic version check
    ///
    /// All events of one call are stored atomically within a transaction.
    async fn append(
        &self,
        request_id: LoanRequestId,
        expected_version: u32,
        events: Vec<DomainEvent>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;
        append_in_tx(&mut *tx, request_id, expected_version, &events).await?;
        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    /// Load all events for a request in the order they were appended
    async fn load(&self, request_id: LoanRequestId) -> Result<Vec<DomainEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT event_data
            FROM events
            WHERE aggregate_id = $1
            ORDER BY aggregate_version ASC
            "#,
        )
        .bind(request_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter()
            .map(|row| {
                let event_data: serde_json::Value = row.get("event_data");
                serde_json::from_value(event_data).map_err(StoreError::backend)
            })
            .collect()
    }
}
