//! Periodic passes, one task per pipeline.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use clubcache_core::{Pipeline, SyncEngine, SyncError};

/// Run `pipeline` immediately and then every `period` until `shutdown`
/// flips to true. Passes of one pipeline never overlap; a pass that runs
/// long delays the next tick instead of stacking up.
pub fn spawn<P>(
    engine: SyncEngine,
    pipeline: P,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    P: Pipeline + 'static,
{
    tokio::spawn(async move {
        let domain = pipeline.domain();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(%domain, period_secs = period.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            match engine.resync(&pipeline).await {
                Ok(_) => {}
                Err(SyncError::Remote(e)) if e.is_auth_failure() => {
                    error!(%domain, error = %e, "Remote source rejected the integration token")
                }
                Err(e) if e.is_schema_drift() => {
                    error!(%domain, error = %e, "Remote schema changed; pass aborted")
                }
                Err(e) => warn!(%domain, error = %e, "Sync pass failed; retrying next tick"),
            }
        }

        info!(%domain, "Scheduler stopped");
    })
}
