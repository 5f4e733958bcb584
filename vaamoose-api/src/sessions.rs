use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaamoose_catalog::PricingQuote;
use vaamoose_core::model::SeatId;
use vaamoose_core::session::ReservationSession;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(cancel_session))
        .route("/sessions/{id}/seats", put(select_seats))
        .route("/sessions/{id}/luggage", put(set_luggage))
        .route("/sessions/{id}/route", put(set_route))
        .route("/sessions/{id}/vehicle", put(set_vehicle))
        .route("/sessions/{id}/checkout", post(checkout))
}

/// Client view of a session; seats use their `row-column` labels.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub company_id: String,
    pub route_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub selected_seats: Vec<String>,
    pub luggage_photo_refs: Option<Vec<String>>,
    pub computed_total: Option<i64>,
    pub missing: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<ReservationSession> for SessionView {
    fn from(session: ReservationSession) -> Self {
        Self {
            missing: session.missing_fields(),
            selected_seats: session.selected_seats.iter().map(SeatId::to_string).collect(),
            id: session.id,
            slot_id: session.slot_id,
            company_id: session.company_id,
            route_id: session.route_id,
            vehicle_id: session.vehicle_id,
            luggage_photo_refs: session.luggage_photo_refs,
            computed_total: session.computed_total,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub slot_id: Uuid,
}

async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let session = state.sessions.create(&claims.sub, req.slot_id).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id, &claims.sub).await?;
    Ok(Json(session.into()))
}

async fn cancel_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.cancel(id, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct SelectSeatsRequest {
    /// `row-column` labels, e.g. `["1-1", "1-2"]`.
    pub seats: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectSeatsResponse {
    pub session: SessionView,
    pub held_until: DateTime<Utc>,
}

async fn select_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectSeatsRequest>,
) -> Result<Json<SelectSeatsResponse>, AppError> {
    let seats = req
        .seats
        .iter()
        .map(|s| s.parse::<SeatId>())
        .collect::<Result<Vec<_>, _>>()?;

    let (session, held) = state.sessions.select_seats(id, &claims.sub, &seats).await?;
    Ok(Json(SelectSeatsResponse {
        session: session.into(),
        held_until: held.held_until,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LuggageRequest {
    pub photo_refs: Vec<String>,
}

async fn set_luggage(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<LuggageRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.set_luggage(id, &claims.sub, req.photo_refs).await?;
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub route_id: String,
}

async fn set_route(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.set_route(id, &claims.sub, &req.route_id).await?;
    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
pub struct VehicleRequest {
    pub vehicle_id: String,
}

async fn set_vehicle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<VehicleRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.set_vehicle(id, &claims.sub, &req.vehicle_id).await?;
    Ok(Json(session.into()))
}

async fn checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<PricingQuote>, AppError> {
    let quote = state.sessions.checkout(id, &claims.sub).await?;
    Ok(Json(quote))
}
