//! Background reservation sweeper.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::services::OrderService;

/// Releases lapsed payment holds every `interval` until `shutdown` flips to true.
pub async fn reservation_sweeper(orders: OrderService, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!(interval_secs = interval.as_secs(), "reservation sweeper started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match orders.sweep_expired(Utc::now()).await {
                    Ok(report) if report.expired_orders > 0 => {
                        tracing::info!(expired = report.expired_orders, released = report.released_lines, "sweep finished");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "reservation sweep failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!("reservation sweeper stopped");
}
