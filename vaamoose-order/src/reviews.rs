use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use vaamoose_core::clock::Clock;
use vaamoose_core::repository::ReviewStore;
use vaamoose_core::review::{Review, ReviewSummary};
use vaamoose_core::{CoreError, CoreResult};

use crate::ledger::BookingLedger;

/// Ratings customers leave for the companies that carried them.
pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    ledger: Arc<BookingLedger>,
    clock: Arc<dyn Clock>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ReviewStore>, ledger: Arc<BookingLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { store, ledger, clock }
    }

    /// One review per paid booking, by the customer who booked it.
    pub async fn submit(&self, user_id: &str, booking_id: Uuid, rating: u8, comment: &str) -> CoreResult<Review> {
        let booking = self.ledger.reviewable(booking_id, user_id).await?;
        let review = Review::new(booking.id, user_id, &booking.company_id, rating, comment, self.clock.now())?;

        if self.store.find_for_booking(booking.id).await?.is_some() {
            return Err(CoreError::AlreadyReviewed(booking.id));
        }
        self.store.create(&review).await?;

        tracing::info!(review_id = %review.id, %booking_id, company = %review.company_id, rating, "Review submitted");
        Ok(review)
    }

    pub async fn company_summary(&self, company_id: &str) -> CoreResult<ReviewSummary> {
        let reviews: Vec<Review> = self.store.list_for_company(company_id).try_collect().await?;
        Ok(ReviewSummary::new(company_id, reviews))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryReviewStore {
    reviews: Mutex<Vec<Review>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn create(&self, review: &Review) -> CoreResult<()> {
        let mut reviews = self.reviews.lock().unwrap_or_else(|e| e.into_inner());
        if reviews.iter().any(|r| r.booking_id == review.booking_id) {
            return Err(CoreError::AlreadyReviewed(review.booking_id));
        }
        reviews.push(review.clone());
        Ok(())
    }

    async fn find_for_booking(&self, booking_id: Uuid) -> CoreResult<Option<Review>> {
        let reviews = self.reviews.lock().unwrap_or_else(|e| e.into_inner());
        Ok(reviews.iter().find(|r| r.booking_id == booking_id).cloned())
    }

    fn list_for_company(&self, company_id: &str) -> BoxStream<'_, CoreResult<Review>> {
        let reviews = self.reviews.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Review> = reviews.iter().filter(|r| r.company_id == company_id).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        stream::iter(found.into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use chrono::Duration;
    use vaamoose_core::booking::Booking;
    use vaamoose_core::model::SeatId;

    async fn booked(h: &Harness, user: &str, seat: SeatId) -> Booking {
        let session = h.sessions.create(user, h.slot_id).await.unwrap();
        h.fill(session.id, user, &[seat]).await;
        let init = h
            .orchestrator
            .initialize(session.id, user, &format!("{}@uni.edu.ng", user), None)
            .await
            .unwrap();
        h.orchestrator.verify(&init.reference).await.unwrap().booking
    }

    fn service(h: &Harness) -> ReviewService {
        ReviewService::new(Arc::new(InMemoryReviewStore::new()), h.ledger.clone(), h.clock.clone())
    }

    #[tokio::test]
    async fn test_one_review_per_paid_booking() {
        let h = Harness::new().await;
        let reviews = service(&h);
        let booking = booked(&h, "ada", SeatId::new(2, 2)).await;

        let review = reviews.submit("ada", booking.id, 5, "On time, clean bus").await.unwrap();
        assert_eq!(review.company_id, "cmp-1");

        let err = reviews.submit("ada", booking.id, 4, "again").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyReviewed(id) if id == booking.id));
    }

    #[tokio::test]
    async fn test_only_the_customer_of_a_paid_booking_may_review() {
        let h = Harness::new().await;
        let reviews = service(&h);
        let booking = booked(&h, "ada", SeatId::new(2, 2)).await;

        let err = reviews.submit("bola", booking.id, 1, "never rode").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = reviews.submit("ada", Uuid::new_v4(), 3, "which trip?").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = reviews.submit("ada", booking.id, 9, "off the scale").await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        h.ledger.mark_refunded(booking.id).await.unwrap();
        let err = reviews.submit("ada", booking.id, 2, "refunded").await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_company_summary_newest_first() {
        let h = Harness::new().await;
        let reviews = service(&h);
        let first = booked(&h, "ada", SeatId::new(2, 1)).await;
        let second = booked(&h, "bola", SeatId::new(2, 2)).await;

        reviews.submit("ada", first.id, 3, "a bit late").await.unwrap();
        h.clock.advance(Duration::minutes(5));
        reviews.submit("bola", second.id, 4, "fine").await.unwrap();

        let summary = reviews.company_summary("cmp-1").await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.average_rating, 3.5);
        assert_eq!(summary.reviews[0].user_id, "bola");

        let empty = reviews.company_summary("cmp-2").await.unwrap();
        assert_eq!(empty.total, 0);
    }
}
