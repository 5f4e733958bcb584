use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use vaamoose_core::review::{Review, ReviewSummary};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/reviews", post(submit_review))
}

/// Anyone may read a company's reviews.
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/partners/{id}/reviews", get(company_reviews))
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub booking_id: Uuid,
    pub rating: u8,
    pub comment: String,
}

async fn submit_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = state
        .reviews
        .submit(&claims.sub, req.booking_id, req.rating, &req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

async fn company_reviews(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<Json<ReviewSummary>, AppError> {
    Ok(Json(state.reviews.company_summary(&company_id).await?))
}
