use serde::{Deserialize, Serialize};
use vaamoose_core::booking::BookedSeat;
use vaamoose_core::model::{Route, SeatClass, SeatId, Vehicle};
use vaamoose_core::{CoreError, CoreResult};

/// Per-class seat surcharge in naira.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurchargeTable {
    pub standard: i64,
    pub window: i64,
    pub front: i64,
}

impl SurchargeTable {
    pub fn for_class(&self, class: SeatClass) -> i64 {
        match class {
            SeatClass::Standard => self.standard,
            SeatClass::Window => self.window,
            SeatClass::Front => self.front,
        }
    }
}

impl Default for SurchargeTable {
    fn default() -> Self {
        Self {
            standard: 0,
            window: 200,
            front: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub surcharges: SurchargeTable,

    /// Upper bound on a vehicle's price multiplier
    pub max_multiplier: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            surcharges: SurchargeTable::default(),
            max_multiplier: 5.0,
        }
    }
}

/// Fare for one booking: vehicle-adjusted route price plus every seat's surcharge.
///
/// The multiplied fare is rounded half away from zero before surcharges are added,
/// so `price(3500, 1.3, &[200, 500]) == 5250`.
pub fn price(base_price: i64, multiplier: f64, surcharges: &[i64]) -> i64 {
    let fare = (base_price as f64 * multiplier).round() as i64;
    fare + surcharges.iter().sum::<i64>()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingQuote {
    pub base_price: i64,
    pub price_multiplier: f64,
    /// `round(base_price * price_multiplier)`
    pub fare: i64,
    pub seats: Vec<BookedSeat>,
    pub seat_surcharge_total: i64,
    pub total: i64,
}

/// Deterministic pricing. The checkout quote and the amount charged both come from here.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn surcharges(&self) -> SurchargeTable {
        self.config.surcharges
    }

    pub fn quote(
        &self,
        route: &Route,
        vehicle: &Vehicle,
        seats: &[(SeatId, SeatClass)],
    ) -> CoreResult<PricingQuote> {
        if route.base_price < 0 {
            return Err(CoreError::ValidationError(format!(
                "route {} has a negative base price",
                route.id
            )));
        }
        let multiplier = vehicle.price_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 || multiplier > self.config.max_multiplier {
            return Err(CoreError::ValidationError(format!(
                "vehicle {} has an invalid price multiplier {}",
                vehicle.id, multiplier
            )));
        }
        if seats.is_empty() {
            return Err(CoreError::ValidationError("no seats to price".to_string()));
        }

        let booked: Vec<BookedSeat> = seats
            .iter()
            .map(|(seat, class)| BookedSeat {
                row: seat.row,
                column: seat.column,
                seat_class: *class,
                price: self.config.surcharges.for_class(*class),
            })
            .collect();
        let surcharges: Vec<i64> = booked.iter().map(|s| s.price).collect();

        let fare = price(route.base_price, multiplier, &[]);
        let total = price(route.base_price, multiplier, &surcharges);

        Ok(PricingQuote {
            base_price: route.base_price,
            price_multiplier: multiplier,
            fare,
            seat_surcharge_total: total - fare,
            seats: booked,
            total,
        })
    }
}
