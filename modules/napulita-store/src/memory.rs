//! In-memory ReportStore for tests and database-less development.
//! Every conditional write happens under one mutex, which is what makes
//! compare-and-set atomic here.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use napulita_common::{Comment, CommentId, Report, ReportId, ReportStatus, Result};
use napulita_geo::IndexEntry;

use crate::store::{index_entry, NewComment, NewReport, ReportStore, StatusChange, StatusGuard};

#[derive(Default)]
struct Tables {
    reports: BTreeMap<ReportId, Report>,
    comments: BTreeMap<CommentId, Comment>,
    next_report: i64,
    next_comment: i64,
}

#[derive(Default)]
pub struct MemoryReportStore {
    tables: Mutex<Tables>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every report (for test assertions).
    pub fn reports(&self) -> Vec<Report> {
        self.lock().reports.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert_report(&self, new: NewReport) -> Result<Report> {
        let mut tables = self.lock();
        tables.next_report += 1;
        let report = Report {
            id: ReportId(tables.next_report),
            reporter_id: new.reporter_id,
            location: new.location,
            category: new.category,
            note: new.note,
            before_photo_ref: new.before_photo_ref,
            status: ReportStatus::Open,
            claimant_id: None,
            after_photo_ref: None,
            after_location: None,
            created_at: new.created_at,
            claimed_at: None,
            cleaned_at: None,
        };
        tables.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn get_report(&self, id: ReportId) -> Result<Option<Report>> {
        Ok(self.lock().reports.get(&id).cloned())
    }

    async fn get_reports(&self, ids: &[ReportId]) -> Result<Vec<Report>> {
        let tables = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.reports.get(id).cloned())
            .collect())
    }

    async fn compare_and_set(
        &self,
        id: ReportId,
        guard: StatusGuard,
        change: StatusChange,
    ) -> Result<Option<Report>> {
        let mut tables = self.lock();
        let Some(current) = tables.reports.get(&id) else {
            return Ok(None);
        };
        if !guard.matches(current) || !current.status.can_transition_to(change.target()) {
            return Ok(None);
        }
        let next = change.apply(current);
        tables.reports.insert(id, next.clone());
        Ok(Some(next))
    }

    async fn claims_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Report>> {
        Ok(self
            .lock()
            .reports
            .values()
            .filter(|r| r.status == ReportStatus::Claimed)
            .filter(|r| r.claimed_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, new: NewComment) -> Result<Comment> {
        let mut tables = self.lock();
        tables.next_comment += 1;
        let comment = Comment {
            id: CommentId(tables.next_comment),
            report_id: new.report_id,
            author_id: new.author_id,
            body: new.body,
            parent_id: new.parent_id,
            created_at: new.created_at,
        };
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        Ok(self.lock().comments.get(&id).cloned())
    }

    async fn list_comments(&self, report_id: ReportId) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .lock()
            .comments
            .values()
            .filter(|c| c.report_id == report_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn index_entries(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.lock().reports.values().map(index_entry).collect())
    }
}
