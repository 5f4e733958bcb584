use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vaamoose_core::booking::{Booking, PaymentStatus};
use vaamoose_order::CompanyDashboard;
use vaamoose_shared::pii::redact_email;

use crate::error::AppError;
use crate::middleware::{Claims, Role};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings/mine", get(my_bookings))
        .route("/bookings/company", get(company_bookings))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings: Vec<Booking> = state.ledger.list_for_user(&claims.sub).try_collect().await?;
    Ok(Json(bookings))
}

/// A booking as a partner sees it; the customer email is redacted.
#[derive(Debug, Serialize)]
pub struct CompanyBooking {
    pub id: Uuid,
    pub payment_reference: String,
    pub customer_email: String,
    pub route_id: String,
    pub vehicle_id: String,
    pub slot_id: Uuid,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub seats: Vec<String>,
    pub total_price: i64,
    pub luggage_photo_refs: Vec<String>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for CompanyBooking {
    fn from(booking: Booking) -> Self {
        Self {
            seats: booking.seat_labels(),
            id: booking.id,
            payment_reference: booking.payment_reference,
            customer_email: redact_email(&booking.customer_email),
            route_id: booking.route_id,
            vehicle_id: booking.vehicle_id,
            slot_id: booking.slot_id,
            departure_date: booking.departure_date,
            departure_time: booking.departure_time,
            total_price: booking.total_price,
            luggage_photo_refs: booking.luggage_photo_refs,
            payment_status: booking.payment_status,
            created_at: booking.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CompanyQuery {
    pub company_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompanyBookingsResponse {
    pub company_id: String,
    pub dashboard: CompanyDashboard,
    pub bookings: Vec<CompanyBooking>,
}

async fn company_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<CompanyBookingsResponse>, AppError> {
    claims.require(&[Role::Partner, Role::Admin])?;
    let company_id = claims.company_scope(query.company_id.as_deref())?;

    let bookings: Vec<Booking> = state.ledger.list_for_company(&company_id).try_collect().await?;
    let dashboard = state.ledger.company_dashboard(&company_id).await?;

    Ok(Json(CompanyBookingsResponse {
        company_id,
        dashboard,
        bookings: bookings.into_iter().map(CompanyBooking::from).collect(),
    }))
}
