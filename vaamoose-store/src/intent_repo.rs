use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use vaamoose_core::booking::BookingDraft;
use vaamoose_core::payment::{IntentStatus, PaymentIntent};
use vaamoose_core::repository::IntentStore;
use vaamoose_core::{CoreError, CoreResult};

use crate::database::{db_err, unique_violation};

pub struct PgIntentStore {
    pool: PgPool,
}

impl PgIntentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct IntentRow {
    reference: String,
    session_id: Uuid,
    user_id: String,
    customer_email: String,
    amount: i64,
    status: String,
    external_reference: Option<String>,
    authorization_url: Option<String>,
    draft: Json<BookingDraft>,
    booking_id: Option<Uuid>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = CoreError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        Ok(PaymentIntent {
            reference: row.reference,
            session_id: row.session_id,
            user_id: row.user_id,
            customer_email: row.customer_email,
            amount: row.amount,
            status: row.status.parse()?,
            external_reference: row.external_reference,
            authorization_url: row.authorization_url,
            draft: row.draft.0,
            booking_id: row.booking_id,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const INTENT_COLUMNS: &str = "reference, session_id, user_id, customer_email, amount, status, \
     external_reference, authorization_url, draft, booking_id, failure_reason, created_at, updated_at";

#[async_trait]
impl IntentStore for PgIntentStore {
    async fn insert(&self, intent: &PaymentIntent) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_intents (reference, session_id, user_id, customer_email, amount,
                status, external_reference, authorization_url, draft, booking_id, failure_reason,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&intent.reference)
        .bind(intent.session_id)
        .bind(&intent.user_id)
        .bind(&intent.customer_email)
        .bind(intent.amount)
        .bind(intent.status.as_str())
        .bind(&intent.external_reference)
        .bind(&intent.authorization_url)
        .bind(Json(&intent.draft))
        .bind(intent.booking_id)
        .bind(&intent.failure_reason)
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => CoreError::DuplicateReference(intent.reference.clone()),
            None => db_err(e),
        })?;
        Ok(())
    }

    async fn get(&self, reference: &str) -> CoreResult<Option<PaymentIntent>> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn find_open_for_session(&self, session_id: Uuid) -> CoreResult<Option<PaymentIntent>> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents \
             WHERE session_id = $1 AND status = 'initialized' \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(PaymentIntent::try_from).transpose()
    }

    async fn compare_and_set(&self, intent: &PaymentIntent, expected: IntentStatus) -> CoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_intents
            SET status = $2, external_reference = $3, authorization_url = $4, booking_id = $5,
                failure_reason = $6, updated_at = $7
            WHERE reference = $1 AND status = $8
            "#,
        )
        .bind(&intent.reference)
        .bind(intent.status.as_str())
        .bind(&intent.external_reference)
        .bind(&intent.authorization_url)
        .bind(intent.booking_id)
        .bind(&intent.failure_reason)
        .bind(intent.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM payment_intents WHERE reference = $1)")
                .bind(&intent.reference)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        if !exists {
            return Err(CoreError::NotFound(format!("payment intent {}", intent.reference)));
        }
        Ok(false)
    }
}
