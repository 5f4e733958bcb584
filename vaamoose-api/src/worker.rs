use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};
use vaamoose_catalog::SeatInventory;
use vaamoose_order::ReconciliationSweeper;

/// Periodically retries orphaned-seat compensation and clears lapsed holds.
///
/// Holds are already ignored once expired; the purge only keeps storage tidy.
pub async fn start_maintenance_worker(
    sweeper: Arc<ReconciliationSweeper>,
    inventory: Arc<SeatInventory>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Maintenance worker started, running every {:?}", every);

    loop {
        ticker.tick().await;

        match sweeper.run_once().await {
            Ok(report) if report.examined > 0 => info!(
                examined = report.examined,
                resolved = report.resolved,
                failed = report.failed,
                "Reconciliation sweep finished"
            ),
            Ok(_) => debug!("Reconciliation sweep found nothing to do"),
            Err(e) => error!("Reconciliation sweep failed: {}", e),
        }

        match inventory.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired seat holds"),
            Err(e) => error!("Failed to purge expired holds: {}", e),
        }
    }
}
