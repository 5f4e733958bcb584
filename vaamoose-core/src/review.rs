use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A customer's rating of the company that carried one paid booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: String,
    pub company_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(
        booking_id: Uuid,
        user_id: &str,
        company_id: &str,
        rating: u8,
        comment: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(CoreError::ValidationError(format!(
                "rating must be between {} and {}",
                MIN_RATING, MAX_RATING
            )));
        }
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(CoreError::ValidationError("a review comment is required".to_string()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            booking_id,
            user_id: user_id.to_string(),
            company_id: company_id.to_string(),
            rating,
            comment: comment.to_string(),
            created_at: now,
        })
    }
}

/// Reviews of one company, newest first, with their mean rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub company_id: String,
    pub total: usize,
    /// Rounded to one decimal; 0.0 when there are no reviews.
    pub average_rating: f64,
    pub reviews: Vec<Review>,
}

impl ReviewSummary {
    pub fn new(company_id: &str, reviews: Vec<Review>) -> Self {
        let total = reviews.len();
        let average_rating = if total == 0 {
            0.0
        } else {
            let sum: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
            (f64::from(sum) / total as f64 * 10.0).round() / 10.0
        };
        Self {
            company_id: company_id.to_string(),
            total,
            average_rating,
            reviews,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds_and_comment() {
        let now = Utc::now();
        let booking = Uuid::new_v4();
        assert!(Review::new(booking, "ada", "cmp-1", 0, "late", now).is_err());
        assert!(Review::new(booking, "ada", "cmp-1", 6, "great", now).is_err());
        assert!(Review::new(booking, "ada", "cmp-1", 4, "   ", now).is_err());

        let review = Review::new(booking, "ada", "cmp-1", 5, " smooth ride ", now).unwrap();
        assert_eq!(review.comment, "smooth ride");
    }

    #[test]
    fn test_summary_average_is_rounded() {
        let now = Utc::now();
        let review = |rating| Review::new(Uuid::new_v4(), "ada", "cmp-1", rating, "ok", now).unwrap();

        let summary = ReviewSummary::new("cmp-1", vec![review(5), review(4), review(4)]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.average_rating, 4.3);

        assert_eq!(ReviewSummary::new("cmp-2", vec![]).average_rating, 0.0);
    }
}
