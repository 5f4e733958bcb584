use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use sqlx::PgPool;
use uuid::Uuid;
use vaamoose_core::repository::ReviewStore;
use vaamoose_core::review::Review;
use vaamoose_core::{CoreError, CoreResult};

use crate::database::{db_err, unique_violation};

pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    booking_id: Uuid,
    user_id: String,
    company_id: String,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = CoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = u8::try_from(row.rating)
            .map_err(|_| CoreError::internal(format!("review {} has rating {}", row.id, row.rating)))?;
        Ok(Review {
            id: row.id,
            booking_id: row.booking_id,
            user_id: row.user_id,
            company_id: row.company_id,
            rating,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn create(&self, review: &Review) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, booking_id, user_id, company_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(review.id)
        .bind(review.booking_id)
        .bind(&review.user_id)
        .bind(&review.company_id)
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => CoreError::AlreadyReviewed(review.booking_id),
            None => db_err(e),
        })?;
        Ok(())
    }

    async fn find_for_booking(&self, booking_id: Uuid) -> CoreResult<Option<Review>> {
        let row: Option<ReviewRow> = sqlx::query_as(
            "SELECT id, booking_id, user_id, company_id, rating, comment, created_at \
             FROM reviews WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(Review::try_from).transpose()
    }

    fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Review>> {
        sqlx::query_as::<_, ReviewRow>(
            "SELECT id, booking_id, user_id, company_id, rating, comment, created_at \
             FROM reviews WHERE company_id = $1 ORDER BY created_at DESC",
        )
        .bind(company_id.to_string())
        .fetch(&self.pool)
        .map(|row| row.map_err(db_err).and_then(Review::try_from))
        .boxed()
    }
}
