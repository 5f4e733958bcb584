use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;
use vaamoose_core::directory::Directory;
use vaamoose_core::model::{DepartureSlot, Route, Vehicle};
use vaamoose_core::{CoreError, CoreResult};

#[derive(Debug, Default)]
struct Records {
    slots: HashMap<Uuid, DepartureSlot>,
    routes: HashMap<String, Route>,
    vehicles: HashMap<String, Vehicle>,
}

/// Partner directory held in memory (tests, local runs).
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: RwLock<Records>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn slot(&self, slot_id: Uuid) -> CoreResult<Option<DepartureSlot>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.slots.get(&slot_id).cloned())
    }

    async fn route(&self, route_id: &str) -> CoreResult<Option<Route>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.routes.get(route_id).cloned())
    }

    async fn vehicle(&self, vehicle_id: &str) -> CoreResult<Option<Vehicle>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.vehicles.get(vehicle_id).cloned())
    }

    async fn list_slots(
        &self,
        company_id: Option<&str>,
        date: Option<NaiveDate>,
    ) -> CoreResult<Vec<DepartureSlot>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut slots: Vec<DepartureSlot> = records
            .slots
            .values()
            .filter(|s| company_id.map_or(true, |c| s.company_id == c))
            .filter(|s| date.map_or(true, |d| s.date == d))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.date, s.time));
        Ok(slots)
    }

    async fn register_slot(&self, slot: &DepartureSlot) -> CoreResult<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.slots.contains_key(&slot.id) {
            return Err(CoreError::ValidationError(format!("slot {} already registered", slot.id)));
        }
        records.slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn upsert_route(&self, route: &Route) -> CoreResult<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.routes.insert(route.id.clone(), route.clone());
        Ok(())
    }

    async fn upsert_vehicle(&self, vehicle: &Vehicle) -> CoreResult<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.vehicles.insert(vehicle.id.clone(), vehicle.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};

    fn slot(company_id: &str, day: u32) -> DepartureSlot {
        DepartureSlot {
            id: Uuid::new_v4(),
            company_id: company_id.to_string(),
            vehicle_id: "veh-1".to_string(),
            route_id: "rte-1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 12, day).unwrap(),
            time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            total_seats: 9,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_slots_filters_and_orders() {
        let directory = InMemoryDirectory::new();
        directory.register_slot(&slot("cmp-1", 20)).await.unwrap();
        directory.register_slot(&slot("cmp-1", 18)).await.unwrap();
        directory.register_slot(&slot("cmp-2", 18)).await.unwrap();

        let mine = directory.list_slots(Some("cmp-1"), None).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine[0].date < mine[1].date);

        let day = NaiveDate::from_ymd_opt(2026, 12, 18);
        assert_eq!(directory.list_slots(None, day).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_register_slot_twice_is_rejected() {
        let directory = InMemoryDirectory::new();
        let s = slot("cmp-1", 18);
        directory.register_slot(&s).await.unwrap();
        assert!(directory.register_slot(&s).await.is_err());
        assert!(directory.slot(s.id).await.unwrap().is_some());
    }
}
