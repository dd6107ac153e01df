//! Postgres-backed ReportStore. Conditional transitions are single
//! `UPDATE ... WHERE status = ANY(..) ... RETURNING` statements, so the
//! guarantee holds across any number of service instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use napulita_common::{
    BoundingBox, Comment, CommentId, GeoPoint, NapulitaError, Report, ReportId, ReportStatus,
    Result,
};
use napulita_geo::{GeoIndex, IndexEntry};

use crate::store::{index_entry, NewComment, NewReport, ReportStore, StatusChange, StatusGuard};

const REPORT_COLUMNS: &str = "id, reporter_id, lat, lon, category, note, before_photo_ref, status, \
     claimant_id, after_photo_ref, after_lat, after_lon, created_at, claimed_at, cleaned_at";

/// A row from the reports table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ReportRow {
    id: i64,
    reporter_id: Uuid,
    lat: f64,
    lon: f64,
    category: String,
    note: Option<String>,
    before_photo_ref: String,
    status: String,
    claimant_id: Option<Uuid>,
    after_photo_ref: Option<String>,
    after_lat: Option<f64>,
    after_lon: Option<f64>,
    created_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    cleaned_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReportRow> for Report {
    type Error = NapulitaError;

    fn try_from(row: ReportRow) -> Result<Self> {
        let after_location = match (row.after_lat, row.after_lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        Ok(Report {
            id: ReportId(row.id),
            reporter_id: row.reporter_id,
            location: GeoPoint::new(row.lat, row.lon),
            category: row.category.parse()?,
            note: row.note,
            before_photo_ref: row.before_photo_ref,
            status: row.status.parse()?,
            claimant_id: row.claimant_id,
            after_photo_ref: row.after_photo_ref,
            after_location,
            created_at: row.created_at,
            claimed_at: row.claimed_at,
            cleaned_at: row.cleaned_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CommentRow {
    id: i64,
    report_id: i64,
    author_id: Uuid,
    body: String,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: CommentId(row.id),
            report_id: ReportId(row.report_id),
            author_id: row.author_id,
            body: row.body,
            parent_id: row.parent_id.map(CommentId),
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(NapulitaError::storage)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(NapulitaError::storage)?;
        info!("Migrations applied");
        Ok(())
    }
}

fn status_strings(statuses: &[ReportStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn rows_to_reports(rows: Vec<ReportRow>) -> Result<Vec<Report>> {
    rows.into_iter().map(Report::try_from).collect()
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn insert_report(&self, new: NewReport) -> Result<Report> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            INSERT INTO reports (reporter_id, lat, lon, category, note, before_photo_ref, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'open', $7)
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(new.reporter_id)
        .bind(new.location.lat)
        .bind(new.location.lon)
        .bind(new.category.as_str())
        .bind(&new.note)
        .bind(&new.before_photo_ref)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        row.try_into()
    }

    async fn get_report(&self, id: ReportId) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        row.map(Report::try_from).transpose()
    }

    async fn get_reports(&self, ids: &[ReportId]) -> Result<Vec<Report>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM reports
            JOIN unnest($1::bigint[]) WITH ORDINALITY AS wanted(id, ord) USING (id)
            ORDER BY wanted.ord
            "#
        ))
        .bind(&raw)
        .fetch_all(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        rows_to_reports(rows)
    }

    async fn compare_and_set(
        &self,
        id: ReportId,
        guard: StatusGuard,
        change: StatusChange,
    ) -> Result<Option<Report>> {
        let sources = guard.legal_sources(change.target());
        if sources.is_empty() {
            return Ok(None);
        }

        // $1 id, $2 expected statuses, $3 claimant guard, $4 claimed_before guard.
        let guard_sql = "WHERE id = $1 \
             AND status = ANY($2::text[]) \
             AND ($3::uuid IS NULL OR claimant_id = $3) \
             AND ($4::timestamptz IS NULL OR claimed_at < $4)";

        let set_sql = match &change {
            StatusChange::Claim { .. } => {
                "status = 'claimed', claimant_id = $5, claimed_at = $6"
            }
            StatusChange::Release => "status = 'open', claimant_id = NULL, claimed_at = NULL",
            StatusChange::Cleanup { .. } => {
                "status = 'cleaned', after_photo_ref = $5, after_lat = $6, after_lon = $7, cleaned_at = $8"
            }
            StatusChange::Invalidate => "status = 'invalid', claimant_id = NULL",
        };

        let sql = format!("UPDATE reports SET {set_sql} {guard_sql} RETURNING {REPORT_COLUMNS}");
        let query = sqlx::query_as::<_, ReportRow>(&sql)
            .bind(id.0)
            .bind(status_strings(&sources))
            .bind(guard.claimant)
            .bind(guard.claimed_before);

        let query = match &change {
            StatusChange::Claim { claimant, at } => query.bind(*claimant).bind(*at),
            StatusChange::Cleanup {
                after_photo_ref,
                after_location,
                at,
            } => query
                .bind(after_photo_ref.clone())
                .bind(after_location.lat)
                .bind(after_location.lon)
                .bind(*at),
            StatusChange::Release | StatusChange::Invalidate => query,
        };

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(NapulitaError::storage)?;

        row.map(Report::try_from).transpose()
    }

    async fn claims_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS}
            FROM reports
            WHERE status = 'claimed' AND claimed_at < $1
            ORDER BY claimed_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        rows_to_reports(rows)
    }

    async fn insert_comment(&self, new: NewComment) -> Result<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            r#"
            INSERT INTO comments (report_id, author_id, body, parent_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, report_id, author_id, body, parent_id, created_at
            "#,
        )
        .bind(new.report_id.0)
        .bind(new.author_id)
        .bind(&new.body)
        .bind(new.parent_id.map(|p| p.0))
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        Ok(row.into())
    }

    async fn get_comment(&self, id: CommentId) -> Result<Option<Comment>> {
        let row = sqlx::query_as::<_, CommentRow>(
            "SELECT id, report_id, author_id, body, parent_id, created_at FROM comments WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        Ok(row.map(Comment::from))
    }

    async fn list_comments(&self, report_id: ReportId) -> Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, report_id, author_id, body, parent_id, created_at
            FROM comments
            WHERE report_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(report_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn index_entries(&self) -> Result<Vec<IndexEntry>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!("SELECT {REPORT_COLUMNS} FROM reports"))
            .fetch_all(&self.pool)
            .await
            .map_err(NapulitaError::storage)?;

        Ok(rows_to_reports(rows)?.iter().map(index_entry).collect())
    }
}

/// The table already carries location, created_at, and status, so the
/// index is a range scan over `reports_lon_lat_idx` and writes are no-ops.
#[async_trait]
impl GeoIndex for PgReportStore {
    async fn insert(&self, _entry: IndexEntry) -> Result<()> {
        Ok(())
    }

    async fn update_status(&self, _id: ReportId, _status: ReportStatus) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id
            FROM reports
            WHERE lon BETWEEN $1 AND $3
              AND lat BETWEEN $2 AND $4
              AND created_at >= $5
              AND ($6::text IS NULL OR status = $6)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(bbox.min_lon)
        .bind(bbox.min_lat)
        .bind(bbox.max_lon)
        .bind(bbox.max_lat)
        .bind(since)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(NapulitaError::storage)?;

        Ok(ids.into_iter().map(ReportId).collect())
    }
}
