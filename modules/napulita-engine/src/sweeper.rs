use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use napulita_common::Result;
use napulita_store::{StatusChange, StatusGuard};

use crate::lifecycle::LifecycleEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub released: usize,
}

impl fmt::Display for SweepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "examined={} released={}", self.examined, self.released)
    }
}

impl LifecycleEngine {
    /// Return claims older than the configured TTL to `open`.
    ///
    /// Each release is conditional on the same claimant still holding a claim
    /// that started before the cutoff, so a cleanup or a fresh claim that lands
    /// mid-sweep wins.
    pub async fn sweep_expired_claims(&self) -> Result<SweepStats> {
        let cutoff = self.clock().now() - self.config().claim_ttl;
        let stale = self.store().claims_older_than(cutoff).await?;
        let mut stats = SweepStats {
            examined: stale.len(),
            released: 0,
        };

        for report in stale {
            let Some(claimant) = report.claimant_id else {
                continue;
            };
            let guard = StatusGuard::claimed_by(claimant).with_claimed_before(cutoff);
            match self
                .store()
                .compare_and_set(report.id, guard, StatusChange::Release)
                .await?
            {
                Some(released) => {
                    self.sync_index(&released).await;
                    info!(report_id = %report.id, claimant_id = %claimant, "Expired claim released");
                    stats.released += 1;
                }
                None => debug!(report_id = %report.id, "Claim changed before expiry"),
            }
        }

        Ok(stats)
    }
}

/// Run [`LifecycleEngine::sweep_expired_claims`] every `every` until the
/// returned handle is aborted.
pub fn spawn_claim_sweeper(engine: Arc<LifecycleEngine>, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "Starting claim expiry sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match engine.sweep_expired_claims().await {
                Ok(stats) if stats.released > 0 => info!("Claim sweep complete. {stats}"),
                Ok(stats) => debug!("Claim sweep complete. {stats}"),
                Err(e) => error!(error = %e, "Claim sweep failed"),
            }
        }
    })
}
