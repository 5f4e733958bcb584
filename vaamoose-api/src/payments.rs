use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use vaamoose_core::payment::VerifiedPayment;
use vaamoose_core::{CoreError, CoreResult};
use vaamoose_order::paystack::verify_signature;
use vaamoose_order::{PaymentInit, WebhookEvent};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/initialize", post(initialize))
        .route("/payments/verify/{reference}", get(verify))
}

/// Gateway callback; authenticated by signature instead of a bearer token.
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(webhook))
}

#[derive(Debug, Deserialize)]
pub struct InitializeRequest {
    pub session_id: Uuid,
    /// Total shown to the customer; rejected if the quote has moved since.
    pub expected_amount: Option<i64>,
}

async fn initialize(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InitializeRequest>,
) -> Result<Json<PaymentInit>, AppError> {
    let init = state
        .payments
        .initialize(req.session_id, &claims.sub, &claims.email, req.expected_amount)
        .await?;
    Ok(Json(init))
}

async fn verify(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(reference): Path<String>,
) -> Result<Json<VerifiedPayment>, AppError> {
    // ownership first: a stranger must not be able to drive someone else's payment
    let intent = state.payments.intent(&reference).await?;
    if intent.user_id != claims.sub && !claims.is_admin() {
        return Err(AppError::AuthorizationError(format!(
            "payment {} belongs to another user",
            reference
        )));
    }

    let outcome = state.payments.verify(&reference).await;
    state.metrics.record_payment(outcome_label(&outcome));
    Ok(Json(outcome?))
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Err(AppError::ServiceUnavailable("payment webhook is not configured".to_string()));
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        tracing::warn!("Rejected webhook with a bad signature");
        return Err(AppError::AuthenticationError("invalid webhook signature".to_string()));
    }

    let event = WebhookEvent::parse(&body)?;
    if !event.is_charge() {
        tracing::debug!(event = %event.event, "Ignoring webhook event");
        return Ok((StatusCode::OK, Json(json!({ "received": true }))));
    }

    let reference = event.data.reference;
    let outcome = state.payments.verify(&reference).await;
    state.metrics.record_payment(outcome_label(&outcome));

    match outcome {
        Ok(verified) => {
            tracing::info!(%reference, booking_id = %verified.booking.id, replayed = verified.replayed, "Webhook settled payment");
            Ok((StatusCode::OK, Json(json!({ "received": true }))))
        }
        // outcome recorded; retrying the webhook would not change it
        Err(e) if e.is_recoverable() || matches!(e, CoreError::NotFound(_)) => {
            tracing::info!(%reference, error = %e, "Webhook acknowledged without booking");
            Ok((StatusCode::OK, Json(json!({ "received": true }))))
        }
        // 5xx so the gateway retries
        Err(e) => Err(e.into()),
    }
}

fn outcome_label(outcome: &CoreResult<VerifiedPayment>) -> &'static str {
    match outcome {
        Ok(v) if v.replayed => "replayed",
        Ok(_) => "booked",
        Err(CoreError::PaymentPending(_)) => "pending",
        Err(CoreError::PaymentError(_)) => "failed",
        Err(CoreError::GatewayUnavailable(_)) => "gateway_unavailable",
        Err(CoreError::SeatConflict { .. }) => "seat_conflict",
        Err(_) => "error",
    }
}
