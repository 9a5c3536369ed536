use crate::services::CreditsService;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Periodically sweep lapsed batches across all accounts
///
/// Failures are logged and retried on the next tick.
pub fn spawn_expiry_worker(
    credits_service: Arc<CreditsService>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = period.as_secs(), "Credits expiry worker started");

        loop {
            interval.tick().await;

            match credits_service.process_expired_batches().await {
                Ok(expired) if expired.is_empty() => {
                    tracing::debug!("No lapsed credit batches");
                }
                Ok(expired) => {
                    tracing::info!(count = expired.len(), "Expiry sweep finished");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Expiry sweep failed");
                }
            }
        }
    })
}
