use crate::domain::{LoanRequestId, ResourceKey, TimeWindow};
use crate::ports::event_store::StoreError;
use crate::ports::reservation_store::{
    Allocation, AllocationChange, AllocationError, HoldState,
    ReservationStore as ReservationStoreTrait, Result,
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use std::collections::BTreeSet;
use std::str::FromStr;

use super::event_store::append_in_tx;

fn from_store_error(err: StoreError) -> AllocationError {
    match err {
        StoreError::VersionConflict {
            request_id,
            expected,
            actual,
        } => AllocationError::VersionConflict {
            request_id,
            expected,
            actual,
        },
        StoreError::Backend(source) => AllocationError::Backend(source),
    }
}

fn invalid_data(message: String) -> AllocationError {
    AllocationError::backend(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    ))
}

fn key_strings(keys: &BTreeSet<ResourceKey>) -> Vec<String> {
    keys.iter().map(ToString::to_string).collect()
}

/// Take a transaction-scoped advisory lock for every key, in key order
///
/// The locks are released on commit or rollback. Acquiring them in the
/// same total order everywhere keeps overlapping key sets from deadlocking.
async fn lock_keys(conn: &mut PgConnection, keys: &BTreeSet<ResourceKey>) -> Result<()> {
    for key in keys {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.to_string())
            .execute(&mut *conn)
            .await
            .map_err(AllocationError::backend)?;
    }
    Ok(())
}

/// Keys that another request holds for an overlapping window
///
/// With `confirmed_only` only confirmed allocations count.
async fn conflicting_keys(
    conn: &mut PgConnection,
    change: &AllocationChange,
    confirmed_only: bool,
) -> Result<Vec<ResourceKey>> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT resource_key
        FROM allocations
        WHERE resource_key = ANY($1)
          AND request_id <> $2
          AND start_at < $4
          AND $3 < end_at
          AND (NOT $5 OR state = 'confirmed')
        ORDER BY resource_key
        "#,
    )
    .bind(key_strings(&change.keys))
    .bind(change.request_id.value())
    .bind(change.window.start())
    .bind(change.window.end())
    .bind(confirmed_only)
    .fetch_all(&mut *conn)
    .await
    .map_err(AllocationError::backend)?;

    let mut keys = rows
        .iter()
        .map(|raw| ResourceKey::from_str(raw).map_err(|e| invalid_data(e.to_string())))
        .collect::<Result<Vec<_>>>()?;
    keys.sort();
    Ok(keys)
}

async fn upsert_allocations(
    conn: &mut PgConnection,
    change: &AllocationChange,
    state: HoldState,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO allocations (request_id, resource_key, start_at, end_at, state)
        SELECT $1, key, $3, $4, $5 FROM UNNEST($2::varchar[]) AS key
        ON CONFLICT (request_id, resource_key)
        DO UPDATE SET
            start_at = EXCLUDED.start_at,
            end_at = EXCLUDED.end_at,
            state = EXCLUDED.state,
            updated_at = NOW()
        "#,
    )
    .bind(change.request_id.value())
    .bind(key_strings(&change.keys))
    .bind(change.window.start())
    .bind(change.window.end())
    .bind(state.as_str())
    .execute(&mut *conn)
    .await
    .map_err(AllocationError::backend)?;
    Ok(())
}

fn map_row_to_allocation(row: &PgRow) -> Result<Allocation> {
    let key: String = row.get("resource_key");
    let state: String = row.get("state");
    let window = TimeWindow::new(row.get("start_at"), row.get("end_at"))
        .map_err(|e| invalid_data(e.to_string()))?;

    Ok(Allocation {
        request_id: LoanRequestId::from_uuid(row.get("request_id")),
        key: ResourceKey::from_str(&key).map_err(|e| invalid_data(e.to_string()))?,
        window,
        state: HoldState::from_str(&state).map_err(invalid_data)?,
    })
}

/// PostgreSQL implementation of ReservationStore
///
/// Every change runs in one transaction: advisory locks on the touched
/// keys, the availability re-check, the event append with its version
/// check, and the allocation rows.
pub struct ReservationStore {
    pool: PgPool,
}

impl ReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationStoreTrait for ReservationStore {
    async fn insert_if_available(&self, change: AllocationChange) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AllocationError::backend)?;
        lock_keys(&mut tx, &change.keys).await?;

        let conflicts = conflicting_keys(&mut tx, &change, false).await?;
        if !conflicts.is_empty() {
            return Err(AllocationError::Unavailable(conflicts));
        }

        append_in_tx(&mut tx, change.request_id, change.expected_version, &change.events)
            .await
            .map_err(from_store_error)?;
        upsert_allocations(&mut tx, &change, HoldState::Tentative).await?;

        tx.commit().await.map_err(AllocationError::backend)?;
        Ok(())
    }

    async fn confirm_allocation(&self, change: AllocationChange) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AllocationError::backend)?;
        lock_keys(&mut tx, &change.keys).await?;

        let conflicts = conflicting_keys(&mut tx, &change, true).await?;
        if !conflicts.is_empty() {
            return Err(AllocationError::Unavailable(conflicts));
        }

        append_in_tx(&mut tx, change.request_id, change.expected_version, &change.events)
            .await
            .map_err(from_store_error)?;
        upsert_allocations(&mut tx, &change, HoldState::Confirmed).await?;

        tx.commit().await.map_err(AllocationError::backend)?;
        Ok(())
    }

    async fn release_allocation(&self, change: AllocationChange) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AllocationError::backend)?;
        lock_keys(&mut tx, &change.keys).await?;

        append_in_tx(&mut tx, change.request_id, change.expected_version, &change.events)
            .await
            .map_err(from_store_error)?;

        sqlx::query("DELETE FROM allocations WHERE request_id = $1")
            .bind(change.request_id.value())
            .execute(&mut *tx)
            .await
            .map_err(AllocationError::backend)?;

        tx.commit().await.map_err(AllocationError::backend)?;
        Ok(())
    }

    async fn allocations_for(&self, key: &ResourceKey) -> Result<Vec<Allocation>> {
        let rows = sqlx::query(
            r#"
            SELECT request_id, resource_key, start_at, end_at, state
            FROM allocations
            WHERE resource_key = $1
            ORDER BY start_at ASC
            "#,
        )
        .bind(key.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(AllocationError::backend)?;

        rows.iter().map(map_row_to_allocation).collect()
    }
}
