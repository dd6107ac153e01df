use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use napulita_common::{Category, NapulitaError, ReportId, Result, UserId};

use crate::ledger::{ScoreEvent, ScoreEventKind, ScoreLedger};
use crate::period::Period;
use crate::policy::PointPolicy;
use crate::scoreboard::{LeaderboardEntry, ScoreCard, Scoreboard};

/// Ledger positions below the cursor that are re-read on every catch-up.
/// Concurrent appends can commit out of sequence order.
const REREAD_WINDOW: i64 = 256;

#[derive(Default)]
struct Projection {
    board: Scoreboard,
    /// Highest ledger position applied.
    cursor: i64,
    /// Applied positions inside the re-read window.
    recent: BTreeSet<i64>,
}

/// Scoring service: writes go to the ledger, reads come from the projection.
///
/// The projection follows the ledger through [`Scoring::catch_up`], so
/// instances sharing one ledger converge on the same leaderboards.
pub struct Scoring {
    ledger: Arc<dyn ScoreLedger>,
    policy: Arc<dyn PointPolicy>,
    projection: RwLock<Projection>,
}

impl Scoring {
    /// Replay the ledger into a fresh projection.
    pub async fn load(ledger: Arc<dyn ScoreLedger>, policy: Arc<dyn PointPolicy>) -> Result<Self> {
        let scoring = Self {
            ledger,
            policy,
            projection: RwLock::new(Projection::default()),
        };
        let events = scoring.catch_up().await?;
        info!(events, policy = scoring.policy.version(), "Scoreboard loaded");
        Ok(scoring)
    }

    /// Apply ledger events not yet in the projection. Returns how many were
    /// applied.
    pub async fn catch_up(&self) -> Result<usize> {
        let mut projection = self.projection.write().await;
        let from = (projection.cursor - REREAD_WINDOW).max(0);
        let entries = self.ledger.load_since(from).await?;

        let mut applied = 0;
        for entry in entries {
            if !projection.recent.insert(entry.seq) {
                continue;
            }
            projection.board.apply(&entry.event);
            projection.cursor = projection.cursor.max(entry.seq);
            applied += 1;
        }

        let floor = projection.cursor - REREAD_WINDOW;
        projection.recent = projection.recent.split_off(&floor);
        Ok(applied)
    }

    pub fn policy_version(&self) -> &str {
        self.policy.version()
    }

    pub fn points_for(&self, category: Category) -> i64 {
        self.policy.points_for(category)
    }

    /// Credit a cleanup. Returns the points awarded, or `None` when this
    /// report was already credited.
    pub async fn record_cleanup(
        &self,
        user_id: UserId,
        report_id: ReportId,
        category: Category,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        if self.projection.read().await.board.is_credited(report_id) {
            debug!(%report_id, "Cleanup already credited");
            return Ok(None);
        }

        let event = ScoreEvent {
            user_id,
            kind: ScoreEventKind::Cleanup {
                report_id,
                category,
            },
            points: self.policy.points_for(category),
            policy_version: self.policy.version().to_string(),
            occurred_at: at,
        };

        if !self.ledger.append(&event).await? {
            debug!(%report_id, "Cleanup already in ledger");
            return Ok(None);
        }

        self.refresh_after_append().await;
        info!(
            %user_id,
            %report_id,
            %category,
            points = event.points,
            policy = %event.policy_version,
            "Cleanup credited"
        );
        Ok(Some(event.points))
    }

    /// Explicit adjustment. The only way a total can go down.
    pub async fn record_correction(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if delta == 0 {
            return Err(NapulitaError::invalid("correction delta must be non-zero"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(NapulitaError::invalid("correction needs a reason"));
        }

        let event = ScoreEvent {
            user_id,
            kind: ScoreEventKind::Correction {
                reason: reason.to_string(),
            },
            points: delta,
            policy_version: self.policy.version().to_string(),
            occurred_at: at,
        };
        self.ledger.append(&event).await?;
        self.refresh_after_append().await;
        info!(%user_id, delta, reason, "Score corrected");
        Ok(())
    }

    pub async fn leaderboard(
        &self,
        period: Period,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<LeaderboardEntry> {
        self.projection
            .read()
            .await
            .board
            .leaderboard(period, limit, now)
    }

    pub async fn score_card(&self, user_id: UserId) -> Option<ScoreCard> {
        self.projection.read().await.board.card(user_id).cloned()
    }

    // The event is durable once appended; a failed read leaves it for the
    // next catch-up.
    async fn refresh_after_append(&self) {
        if let Err(e) = self.catch_up().await {
            warn!(error = %e, "Scoreboard catch-up after append failed");
        }
    }
}

/// Run [`Scoring::catch_up`] every `every` until the returned handle is
/// aborted. Needed when other instances append to the same ledger.
pub fn spawn_score_refresher(scoring: Arc<Scoring>, every: Duration) -> JoinHandle<()> {
    info!(interval_secs = every.as_secs(), "Starting scoreboard refresher");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match scoring.catch_up().await {
                Ok(0) => {}
                Ok(applied) => debug!(applied, "Scoreboard caught up"),
                Err(e) => error!(error = %e, "Scoreboard catch-up failed"),
            }
        }
    })
}
