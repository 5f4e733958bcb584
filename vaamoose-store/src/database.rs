use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use vaamoose_core::CoreError;

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays `business_rules` rows (`{"value": ...}`) on the file configuration.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> = sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for (key, value) in rows {
            if !apply_rule(&mut rules, &key, &value) {
                tracing::warn!(rule = %key, "Ignoring unknown or malformed business rule");
            }
        }
        Ok(rules)
    }
}

fn apply_rule(rules: &mut BusinessRules, key: &str, value: &Value) -> bool {
    let Some(v) = value.get("value") else {
        return false;
    };
    match key {
        "seat_hold_seconds" => set(&mut rules.seat_hold_seconds, v.as_u64()),
        "payment_hold_seconds" => set(&mut rules.payment_hold_seconds, v.as_u64()),
        "session_idle_seconds" => set(&mut rules.session_idle_seconds, v.as_u64()),
        "compensation_hold_seconds" => set(&mut rules.compensation_hold_seconds, v.as_u64()),
        "surcharge_standard" => set(&mut rules.surcharge_standard, v.as_i64()),
        "surcharge_window" => set(&mut rules.surcharge_window, v.as_i64()),
        "surcharge_front" => set(&mut rules.surcharge_front, v.as_i64()),
        "max_price_multiplier" => set(&mut rules.max_price_multiplier, v.as_f64()),
        "max_luggage_photos" => set(&mut rules.max_luggage_photos, v.as_u64().map(|n| n as usize)),
        _ => false,
    }
}

fn set<T>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = v;
            true
        }
        None => false,
    }
}

pub(crate) fn db_err(err: sqlx::Error) -> CoreError {
    CoreError::InternalError(format!("database error: {}", err))
}

/// Constraint name when `err` is a unique violation.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> BusinessRules {
        BusinessRules {
            seat_hold_seconds: 600,
            payment_hold_seconds: 1200,
            session_idle_seconds: 900,
            session_retention_grace_seconds: 1800,
            compensation_hold_seconds: 120,
            surcharge_standard: 0,
            surcharge_window: 200,
            surcharge_front: 500,
            max_price_multiplier: 5.0,
            max_luggage_photos: 5,
        }
    }

    #[test]
    fn test_rule_overrides() {
        let mut rules = defaults();
        assert!(apply_rule(&mut rules, "surcharge_front", &json!({"value": 750})));
        assert!(apply_rule(&mut rules, "seat_hold_seconds", &json!({"value": 300})));
        assert!(!apply_rule(&mut rules, "surcharge_window", &json!({"value": "cheap"})));
        assert!(!apply_rule(&mut rules, "tax_rate", &json!({"value": 0.075})));
        assert!(!apply_rule(&mut rules, "surcharge_window", &json!(250)));

        assert_eq!(rules.surcharge_front, 750);
        assert_eq!(rules.seat_hold_seconds, 300);
        assert_eq!(rules.surcharge_window, 200);
    }
}
