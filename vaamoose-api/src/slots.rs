use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;
use vaamoose_core::model::{DepartureSlot, SeatClass, SeatState};
use vaamoose_core::CoreError;

use crate::error::AppError;
use crate::middleware::{Claims, Role};
use crate::state::AppState;

/// Public browsing: slot listing, seat maps and the live seat stream.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/slots", get(list_slots))
        .route("/slots/{id}/seats", get(seat_map))
        .route("/slots/{id}/stream", get(stream_seats))
}

pub fn partner_routes() -> Router<AppState> {
    Router::new().route("/partners/slots", post(register_slot))
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub company_id: Option<String>,
    pub date: Option<NaiveDate>,
}

async fn list_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Vec<DepartureSlot>>, AppError> {
    let slots = state
        .directory
        .list_slots(query.company_id.as_deref(), query.date)
        .await?;
    Ok(Json(slots))
}

#[derive(Debug, Deserialize)]
pub struct RegisterSlotRequest {
    pub vehicle_id: String,
    pub route_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Admins only; partners always register for their own company.
    pub company_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterSlotResponse {
    pub slot: DepartureSlot,
    pub seats: usize,
}

async fn register_slot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterSlotRequest>,
) -> Result<(StatusCode, Json<RegisterSlotResponse>), AppError> {
    claims.require(&[Role::Partner, Role::Admin])?;
    let company_id = claims.company_scope(req.company_id.as_deref())?;

    let vehicle = state
        .directory
        .vehicle(&req.vehicle_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("vehicle {}", req.vehicle_id)))?;
    let route = state
        .directory
        .route(&req.route_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("route {}", req.route_id)))?;
    if vehicle.company_id != company_id || route.company_id != company_id {
        return Err(AppError::AuthorizationError(format!(
            "vehicle and route must belong to company {}",
            company_id
        )));
    }

    let now = state.inventory.now();
    let (rows, columns) = vehicle.vehicle_type.grid();
    let slot = DepartureSlot {
        id: Uuid::new_v4(),
        company_id,
        vehicle_id: vehicle.id,
        route_id: route.id,
        date: req.date,
        time: req.time,
        total_seats: u32::from(rows) * u32::from(columns),
        created_at: now,
    };
    if slot.departs_at() <= now {
        return Err(AppError::ValidationError("departure must be in the future".to_string()));
    }

    state.directory.register_slot(&slot).await?;
    let layout = state.inventory.initialize_slot(slot.id, vehicle.vehicle_type).await?;

    Ok((StatusCode::CREATED, Json(RegisterSlotResponse { slot, seats: layout.len() })))
}

#[derive(Debug, Serialize)]
pub struct SeatView {
    pub seat: String,
    pub row: u16,
    pub column: u16,
    pub seat_class: SeatClass,
    pub state: SeatState,
}

async fn seat_map(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Vec<SeatView>>, AppError> {
    let seats = state
        .inventory
        .availability(slot_id)
        .await?
        .into_iter()
        .map(|record| SeatView {
            seat: record.seat.to_string(),
            row: record.seat.row,
            column: record.seat.column,
            seat_class: record.seat_class,
            state: record.state,
        })
        .collect();
    Ok(Json(seats))
}

async fn stream_seats(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state
        .directory
        .slot(slot_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("slot {}", slot_id)))?;

    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(change) if change.slot_id == slot_id => Event::default()
                .event("seats_changed")
                .json_data(&change)
                .ok()
                .map(Ok),
            Ok(_) => None,
            Err(e) => {
                // lagged receiver; the client refetches the seat map
                tracing::debug!(%slot_id, error = %e, "SSE subscriber lagged");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
