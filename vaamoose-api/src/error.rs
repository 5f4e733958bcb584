use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vaamoose_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    ServiceUnavailable(String),
    Core(CoreError),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg })),
            AppError::Core(err) => core_response(err),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

fn core_response(err: CoreError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        CoreError::SeatConflict { slot_id, seats } => (
            StatusCode::CONFLICT,
            json!({
                "error": message,
                "slot_id": slot_id,
                "seats": seats.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            }),
        ),
        CoreError::IncompleteSession { missing } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": message, "missing": missing }),
        ),
        CoreError::PaymentError(_) => (StatusCode::PAYMENT_REQUIRED, json!({ "error": message })),
        CoreError::GatewayUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message })),
        CoreError::PaymentPending(_) => (
            StatusCode::ACCEPTED,
            json!({ "error": message, "status": "pending" }),
        ),
        CoreError::SessionExpired(_) => (StatusCode::GONE, json!({ "error": message })),
        CoreError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": message })),
        CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, json!({ "error": message })),
        CoreError::ValidationError(_) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
        CoreError::InvalidTransition { .. } | CoreError::DuplicateReference(_) | CoreError::AlreadyReviewed(_) => {
            (StatusCode::CONFLICT, json!({ "error": message }))
        }
        CoreError::ReconciliationFailure { .. } | CoreError::InternalError(_) => {
            tracing::error!("Internal Server Error: {}", message);
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaamoose_core::model::SeatId;

    #[test]
    fn test_status_mapping() {
        let status = |e: CoreError| AppError::from(e).into_response().status();

        assert_eq!(
            status(CoreError::SeatConflict { slot_id: uuid::Uuid::new_v4(), seats: vec![SeatId::new(1, 1)] }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(CoreError::IncompleteSession { missing: vec!["luggage".to_string()] }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status(CoreError::PaymentError("declined".into())), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(status(CoreError::PaymentPending("ongoing".into())), StatusCode::ACCEPTED);
        assert_eq!(
            status(CoreError::GatewayUnavailable("timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(CoreError::SessionExpired(uuid::Uuid::new_v4())), StatusCode::GONE);
        assert_eq!(
            status(CoreError::ReconciliationFailure { reference: "VMS-1".into(), detail: "x".into() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
