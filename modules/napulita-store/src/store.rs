use async_trait::async_trait;
use chrono::{DateTime, Utc};

use napulita_common::{
    Category, Comment, CommentId, GeoPoint, Report, ReportId, ReportStatus, Result, UserId,
};
use napulita_geo::IndexEntry;

/// A report to be inserted. The store assigns the id; status starts at `open`.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub reporter_id: UserId,
    pub location: GeoPoint,
    pub category: Category,
    pub note: Option<String>,
    pub before_photo_ref: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub report_id: ReportId,
    pub author_id: UserId,
    pub body: String,
    pub parent_id: Option<CommentId>,
    pub created_at: DateTime<Utc>,
}

/// Precondition for a conditional status write. All present parts must hold.
#[derive(Debug, Clone)]
pub struct StatusGuard {
    pub expected: Vec<ReportStatus>,
    pub claimant: Option<UserId>,
    pub claimed_before: Option<DateTime<Utc>>,
}

impl StatusGuard {
    pub fn status(expected: ReportStatus) -> Self {
        Self {
            expected: vec![expected],
            claimant: None,
            claimed_before: None,
        }
    }

    pub fn any_of(expected: &[ReportStatus]) -> Self {
        Self {
            expected: expected.to_vec(),
            claimant: None,
            claimed_before: None,
        }
    }

    pub fn claimed_by(claimant: UserId) -> Self {
        Self {
            expected: vec![ReportStatus::Claimed],
            claimant: Some(claimant),
            claimed_before: None,
        }
    }

    pub fn with_claimed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.claimed_before = Some(cutoff);
        self
    }

    pub fn matches(&self, report: &Report) -> bool {
        self.expected.contains(&report.status)
            && self
                .claimant
                .map_or(true, |c| report.claimant_id == Some(c))
            && self
                .claimed_before
                .map_or(true, |cutoff| report.claimed_at.is_some_and(|at| at < cutoff))
    }

    /// Expected statuses narrowed to those with a legal edge into `target`.
    pub fn legal_sources(&self, target: ReportStatus) -> Vec<ReportStatus> {
        self.expected
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum StatusChange {
    Claim {
        claimant: UserId,
        at: DateTime<Utc>,
    },
    Release,
    Cleanup {
        after_photo_ref: String,
        after_location: GeoPoint,
        at: DateTime<Utc>,
    },
    Invalidate,
}

impl StatusChange {
    pub fn target(&self) -> ReportStatus {
        match self {
            Self::Claim { .. } => ReportStatus::Claimed,
            Self::Release => ReportStatus::Open,
            Self::Cleanup { .. } => ReportStatus::Cleaned,
            Self::Invalidate => ReportStatus::Invalid,
        }
    }

    /// The report after this change. Callers must have checked the guard.
    pub fn apply(&self, report: &Report) -> Report {
        let mut next = report.clone();
        next.status = self.target();
        match self {
            Self::Claim { claimant, at } => {
                next.claimant_id = Some(*claimant);
                next.claimed_at = Some(*at);
            }
            Self::Release => {
                next.claimant_id = None;
                next.claimed_at = None;
            }
            Self::Cleanup {
                after_photo_ref,
                after_location,
                at,
            } => {
                next.after_photo_ref = Some(after_photo_ref.clone());
                next.after_location = Some(*after_location);
                next.cleaned_at = Some(*at);
            }
            Self::Invalidate => {
                next.claimant_id = None;
            }
        }
        next
    }
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, new: NewReport) -> Result<Report>;

    async fn get_report(&self, id: ReportId) -> Result<Option<Report>>;

    /// Reports for the given ids, in the order given. Unknown ids are skipped.
    async fn get_reports(&self, ids: &[ReportId]) -> Result<Vec<Report>>;

    /// Atomically apply `change` iff `guard` holds and the edge is legal.
    /// Returns the updated report, or `None` when the guard did not match.
    async fn compare_and_set(
        &self,
        id: ReportId,
        guard: StatusGuard,
        change: StatusChange,
    ) -> Result<Option<Report>>;

    /// Claimed reports whose claim started before `cutoff`.
    async fn claims_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Report>>;

    async fn insert_comment(&self, new: NewComment) -> Result<Comment>;

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>>;

    /// Comments on a report, oldest first.
    async fn list_comments(&self, report_id: ReportId) -> Result<Vec<Comment>>;

    /// Every report as a geo index entry, for rebuilding an in-memory index.
    async fn index_entries(&self) -> Result<Vec<IndexEntry>>;
}

pub fn index_entry(report: &Report) -> IndexEntry {
    IndexEntry {
        id: report.id,
        location: report.location,
        created_at: report.created_at,
        status: report.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn claimed_report(claimant: UserId, claimed_at: DateTime<Utc>) -> Report {
        Report {
            id: ReportId(1),
            reporter_id: Uuid::new_v4(),
            location: GeoPoint::new(40.85, 14.27),
            category: Category::Trash,
            note: None,
            before_photo_ref: "before.jpg".into(),
            status: ReportStatus::Claimed,
            claimant_id: Some(claimant),
            after_photo_ref: None,
            after_location: None,
            created_at: claimed_at,
            claimed_at: Some(claimed_at),
            cleaned_at: None,
        }
    }

    #[test]
    fn guard_checks_claimant_and_age() {
        let alice = Uuid::new_v4();
        let now = Utc::now();
        let report = claimed_report(alice, now - chrono::Duration::hours(80));

        assert!(StatusGuard::claimed_by(alice).matches(&report));
        assert!(!StatusGuard::claimed_by(Uuid::new_v4()).matches(&report));
        assert!(StatusGuard::status(ReportStatus::Claimed)
            .with_claimed_before(now - chrono::Duration::hours(72))
            .matches(&report));
        assert!(!StatusGuard::status(ReportStatus::Claimed)
            .with_claimed_before(now - chrono::Duration::hours(90))
            .matches(&report));
        assert!(!StatusGuard::status(ReportStatus::Open).matches(&report));
    }

    #[test]
    fn release_and_invalidate_clear_claimant() {
        let alice = Uuid::new_v4();
        let report = claimed_report(alice, Utc::now());

        let released = StatusChange::Release.apply(&report);
        assert_eq!(released.status, ReportStatus::Open);
        assert!(released.check_invariants().is_ok());

        let invalid = StatusChange::Invalidate.apply(&report);
        assert_eq!(invalid.status, ReportStatus::Invalid);
        assert!(invalid.check_invariants().is_ok());
    }

    #[test]
    fn legal_sources_drop_illegal_edges() {
        let guard = StatusGuard::any_of(&ReportStatus::ALL);
        assert_eq!(
            guard.legal_sources(ReportStatus::Invalid),
            vec![ReportStatus::Open, ReportStatus::Claimed]
        );
        assert_eq!(
            guard.legal_sources(ReportStatus::Cleaned),
            vec![ReportStatus::Claimed]
        );
    }
}
