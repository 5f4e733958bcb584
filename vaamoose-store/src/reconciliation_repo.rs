use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use vaamoose_core::repository::{ReconciliationEntry, ReconciliationStore};
use vaamoose_core::{CoreError, CoreResult};

use crate::database::db_err;

pub struct PgReconciliationStore {
    pool: PgPool,
}

impl PgReconciliationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    payment_reference: String,
    kind: String,
    detail: String,
    attempts: i32,
    resolved: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for ReconciliationEntry {
    type Error = CoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(ReconciliationEntry {
            id: row.id,
            payment_reference: row.payment_reference,
            kind: row.kind.parse()?,
            detail: row.detail,
            attempts: row.attempts,
            resolved: row.resolved,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ReconciliationStore for PgReconciliationStore {
    async fn record(&self, entry: &ReconciliationEntry) -> CoreResult<bool> {
        // the partial unique index allows one open entry per (reference, kind)
        let result = sqlx::query(
            r#"
            INSERT INTO reconciliation_entries
                (id, payment_reference, kind, detail, attempts, resolved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (payment_reference, kind) WHERE NOT resolved DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(&entry.payment_reference)
        .bind(entry.kind.as_str())
        .bind(&entry.detail)
        .bind(entry.attempts)
        .bind(entry.resolved)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let recorded = result.rows_affected() == 1;
        if recorded {
            tracing::warn!(
                reference = %entry.payment_reference,
                kind = entry.kind.as_str(),
                detail = %entry.detail,
                "Reconciliation entry recorded"
            );
        }
        Ok(recorded)
    }

    async fn list_open(&self) -> CoreResult<Vec<ReconciliationEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT id, payment_reference, kind, detail, attempts, resolved, created_at, updated_at \
             FROM reconciliation_entries WHERE NOT resolved ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ReconciliationEntry::try_from).collect()
    }

    async fn resolve(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE reconciliation_entries SET resolved = TRUE, updated_at = $2 \
             WHERE id = $1 AND NOT resolved",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM reconciliation_entries WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        if !exists {
            return Err(CoreError::NotFound(format!("reconciliation entry {}", id)));
        }
        Ok(false)
    }

    async fn bump_attempts(&self, id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query(
            "UPDATE reconciliation_entries SET attempts = attempts + 1, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
