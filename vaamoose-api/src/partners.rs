use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::Deserialize;
use vaamoose_core::model::{Route, Vehicle, VehicleType};

use crate::error::AppError;
use crate::middleware::{Claims, Role};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/partners/routes", post(upsert_route))
        .route("/partners/vehicles", post(upsert_vehicle))
}

#[derive(Debug, Deserialize)]
pub struct UpsertRouteRequest {
    pub id: String,
    pub origin: String,
    pub destination: String,
    /// Naira.
    pub base_price: i64,
    pub company_id: Option<String>,
}

async fn upsert_route(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertRouteRequest>,
) -> Result<Json<Route>, AppError> {
    claims.require(&[Role::Partner, Role::Admin])?;
    let company_id = claims.company_scope(req.company_id.as_deref())?;
    if req.id.trim().is_empty() || req.origin.trim().is_empty() || req.destination.trim().is_empty() {
        return Err(AppError::ValidationError("id, origin and destination are required".to_string()));
    }
    if req.base_price <= 0 {
        return Err(AppError::ValidationError("base_price must be positive".to_string()));
    }
    ensure_owner(state.directory.route(&req.id).await?.map(|r| r.company_id), &company_id)?;

    let route = Route {
        id: req.id,
        company_id,
        origin: req.origin,
        destination: req.destination,
        base_price: req.base_price,
    };
    state.directory.upsert_route(&route).await?;
    tracing::info!(route_id = %route.id, company = %route.company_id, "Route saved");
    Ok(Json(route))
}

#[derive(Debug, Deserialize)]
pub struct UpsertVehicleRequest {
    pub id: String,
    pub name: String,
    pub vehicle_type: VehicleType,
    pub price_multiplier: f64,
    pub company_id: Option<String>,
}

async fn upsert_vehicle(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertVehicleRequest>,
) -> Result<Json<Vehicle>, AppError> {
    claims.require(&[Role::Partner, Role::Admin])?;
    let company_id = claims.company_scope(req.company_id.as_deref())?;
    if req.id.trim().is_empty() {
        return Err(AppError::ValidationError("id is required".to_string()));
    }
    if !(req.price_multiplier.is_finite() && req.price_multiplier > 0.0) {
        return Err(AppError::ValidationError("price_multiplier must be positive".to_string()));
    }
    ensure_owner(state.directory.vehicle(&req.id).await?.map(|v| v.company_id), &company_id)?;

    let (rows, columns) = req.vehicle_type.grid();
    let vehicle = Vehicle {
        id: req.id,
        company_id,
        name: req.name,
        vehicle_type: req.vehicle_type,
        capacity: u32::from(rows) * u32::from(columns),
        price_multiplier: req.price_multiplier,
    };
    state.directory.upsert_vehicle(&vehicle).await?;
    tracing::info!(vehicle_id = %vehicle.id, company = %vehicle.company_id, "Vehicle saved");
    Ok(Json(vehicle))
}

/// An existing record may only be overwritten by its own company.
fn ensure_owner(existing_company: Option<String>, company_id: &str) -> Result<(), AppError> {
    match existing_company {
        Some(owner) if owner != company_id => Err(AppError::AuthorizationError(format!(
            "record belongs to company {}",
            owner
        ))),
        _ => Ok(()),
    }
}
