//! ScoreLedger implementations: the append-only record of point events.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use napulita_common::{Category, NapulitaError, ReportId, Result, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreEventKind {
    Cleanup {
        report_id: ReportId,
        category: Category,
    },
    Correction {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub user_id: UserId,
    pub kind: ScoreEventKind,
    pub points: i64,
    pub policy_version: String,
    pub occurred_at: DateTime<Utc>,
}

impl ScoreEvent {
    pub fn cleanup_report(&self) -> Option<ReportId> {
        match self.kind {
            ScoreEventKind::Cleanup { report_id, .. } => Some(report_id),
            ScoreEventKind::Correction { .. } => None,
        }
    }
}

/// An event with its position in the ledger. Positions start at 1 and only
/// grow.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub seq: i64,
    pub event: ScoreEvent,
}

#[async_trait]
pub trait ScoreLedger: Send + Sync {
    /// Append an event. Returns false, without appending, when a cleanup
    /// event for the same report is already recorded.
    async fn append(&self, event: &ScoreEvent) -> Result<bool>;

    /// Events after position `after`, in append order. `load_since(0)`
    /// returns the whole ledger.
    async fn load_since(&self, after: i64) -> Result<Vec<LedgerEntry>>;
}

// ---------------------------------------------------------------------------
// MemoryScoreLedger (tests, no database required)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryScoreLedger {
    events: Mutex<Vec<ScoreEvent>>,
}

impl MemoryScoreLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read all recorded events (for test assertions).
    pub fn events(&self) -> Vec<ScoreEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ScoreLedger for MemoryScoreLedger {
    async fn append(&self, event: &ScoreEvent) -> Result<bool> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(report_id) = event.cleanup_report() {
            if events.iter().any(|e| e.cleanup_report() == Some(report_id)) {
                return Ok(false);
            }
        }
        events.push(event.clone());
        Ok(true)
    }

    async fn load_since(&self, after: i64) -> Result<Vec<LedgerEntry>> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let skip = usize::try_from(after.max(0)).unwrap_or(usize::MAX);
        Ok(events
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, event)| LedgerEntry {
                seq: i as i64 + 1,
                event: event.clone(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// PgScoreLedger (production, postgres)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct ScoreEventRow {
    seq: i64,
    user_id: Uuid,
    kind: String,
    report_id: Option<i64>,
    category: Option<String>,
    reason: Option<String>,
    points: i64,
    policy_version: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<ScoreEventRow> for LedgerEntry {
    type Error = NapulitaError;

    fn try_from(row: ScoreEventRow) -> Result<Self> {
        let kind = match (row.kind.as_str(), row.report_id, row.category) {
            ("cleanup", Some(report_id), Some(category)) => ScoreEventKind::Cleanup {
                report_id: ReportId(report_id),
                category: category.parse()?,
            },
            ("correction", _, _) => ScoreEventKind::Correction {
                reason: row.reason.unwrap_or_default(),
            },
            (other, _, _) => {
                return Err(NapulitaError::storage(format!(
                    "malformed score event of kind {other}"
                )))
            }
        };
        Ok(LedgerEntry {
            seq: row.seq,
            event: ScoreEvent {
                user_id: row.user_id,
                kind,
                points: row.points,
                policy_version: row.policy_version,
                occurred_at: row.occurred_at,
            },
        })
    }
}

/// Score ledger backed by the `score_events` table. The partial unique index
/// on `report_id` makes a second cleanup credit a no-op, even across instances.
#[derive(Clone)]
pub struct PgScoreLedger {
    pool: PgPool,
}

impl PgScoreLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreLedger for PgScoreLedger {
    async fn append(&self, event: &ScoreEvent) -> Result<bool> {
        let (kind, report_id, category, reason) = match &event.kind {
            ScoreEventKind::Cleanup {
                report_id,
                category,
            } => ("cleanup", Some(report_id.0), Some(category.as_str()), None),
            ScoreEventKind::Correction { reason } => {
                ("correction", None, None, Some(reason.as_str()))
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO score_events (user_id, kind, report_id, category, reason, points, policy_version, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (report_id) WHERE kind = 'cleanup' DO NOTHING
            "#,
        )
        .bind(event.user_id)
        .bind(kind)
        .bind(report_id)
        .bind(category)
        .bind(reason)
        .bind(event.points)
        .bind(&event.policy_version)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        Ok(result.rows_affected() == 1)
    }

    async fn load_since(&self, after: i64) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, ScoreEventRow>(
            r#"
            SELECT seq, user_id, kind, report_id, category, reason, points, policy_version, occurred_at
            FROM score_events
            WHERE seq > $1
            ORDER BY seq ASC
            "#,
        )
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}
