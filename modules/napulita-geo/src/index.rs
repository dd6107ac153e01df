use async_trait::async_trait;
use chrono::{DateTime, Utc};

use napulita_common::{BoundingBox, GeoPoint, ReportId, ReportStatus, Result};

/// What the index keeps per report. `created_at` and `status` are denormalized
/// copies so box queries never need to touch the report store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: ReportId,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub status: ReportStatus,
}

impl IndexEntry {
    pub fn matches(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
        status: Option<ReportStatus>,
    ) -> bool {
        bbox.contains(&self.location)
            && self.created_at >= since
            && status.map_or(true, |s| s == self.status)
    }
}

#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// Add a report. Called once per report; location never changes afterwards.
    async fn insert(&self, entry: IndexEntry) -> Result<()>;

    /// Refresh the denormalized status after a lifecycle transition.
    async fn update_status(&self, id: ReportId, status: ReportStatus) -> Result<()>;

    /// Report ids inside `bbox` created at or after `since`, most recent first.
    async fn query(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportId>>;
}

/// Most recent first; id breaks ties so output order is stable.
pub fn sort_most_recent_first(entries: &mut [IndexEntry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
