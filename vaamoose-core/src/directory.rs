use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::model::{DepartureSlot, Route, Vehicle};
use crate::CoreResult;

/// Read side of the partner directory (routes, vehicles, departure slots).
///
/// The reservation engine treats these records as opaque references; partner
/// onboarding and approval live elsewhere.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn slot(&self, slot_id: Uuid) -> CoreResult<Option<DepartureSlot>>;

    async fn route(&self, route_id: &str) -> CoreResult<Option<Route>>;

    async fn vehicle(&self, vehicle_id: &str) -> CoreResult<Option<Vehicle>>;

    async fn list_slots(
        &self,
        company_id: Option<&str>,
        date: Option<NaiveDate>,
    ) -> CoreResult<Vec<DepartureSlot>>;

    async fn register_slot(&self, slot: &DepartureSlot) -> CoreResult<()>;

    async fn upsert_route(&self, route: &Route) -> CoreResult<()>;

    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> CoreResult<()>;
}
