use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use uuid::Uuid;
use vaamoose_core::booking::Booking;
use vaamoose_core::repository::ReconciliationEntry;
use vaamoose_core::CoreError;
use vaamoose_order::SweepReport;

use crate::error::AppError;
use crate::middleware::{Claims, Role};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/bookings/{id}/refund", post(refund_booking))
        .route("/admin/reconciliations", get(list_reconciliations))
        .route("/admin/reconciliations/sweep", post(run_sweep))
        .route("/admin/reconciliations/{id}/resolve", post(resolve_reconciliation))
}

/// Records a refund issued outside the system. Seats stay occupied.
async fn refund_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    claims.require(&[Role::Admin])?;
    let booking = state.ledger.mark_refunded(id).await?;
    tracing::info!(booking_id = %id, admin = %claims.sub, "Refund recorded");
    Ok(Json(booking))
}

async fn list_reconciliations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ReconciliationEntry>>, AppError> {
    claims.require(&[Role::Admin])?;
    Ok(Json(state.reconciliation.list_open().await?))
}

async fn run_sweep(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SweepReport>, AppError> {
    claims.require(&[Role::Admin])?;
    Ok(Json(state.sweeper.run_once().await?))
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub id: Uuid,
    pub resolved: bool,
}

async fn resolve_reconciliation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResolveResponse>, AppError> {
    claims.require(&[Role::Admin])?;
    let changed = state.reconciliation.resolve(id, state.inventory.now()).await?;
    if !changed {
        return Err(CoreError::InvalidTransition {
            from: "resolved".to_string(),
            to: "resolved".to_string(),
        }
        .into());
    }
    tracing::info!(entry_id = %id, admin = %claims.sub, "Reconciliation entry resolved");
    Ok(Json(ResolveResponse { id, resolved: true }))
}
