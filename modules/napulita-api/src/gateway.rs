//! Parameter normalization between external requests and the engine.
//!
//! Absent parameters (including empty strings) get defaults; present but
//! unparseable ones are `InvalidArgument`, never silently replaced.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use napulita_common::{
    Actor, BoundingBox, Category, Comment, CommentId, GeoPoint, NapulitaError, Report, ReportId,
    ReportStatus, Result, UserId,
};
use napulita_engine::{CreateReport, LifecycleEngine};
use napulita_scoring::{LeaderboardEntry, Period};

use crate::retry::{with_retry, RetryConfig};

pub const DEFAULT_DAYS: i64 = 21;
pub const MAX_DAYS: i64 = 3650;
pub const DEFAULT_LIMIT: usize = 200;
pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;
pub const MAX_LEADERBOARD_LIMIT: usize = 100;

// --- Request shapes ---

/// Report search parameters exactly as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReportQuery {
    #[serde(alias = "minLon")]
    pub min_lon: Option<String>,
    #[serde(alias = "minLat")]
    pub min_lat: Option<String>,
    #[serde(alias = "maxLon")]
    pub max_lon: Option<String>,
    #[serde(alias = "maxLat")]
    pub max_lat: Option<String>,
    pub days: Option<String>,
    pub status: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub bbox: BoundingBox,
    pub days: i64,
    pub status: Option<ReportStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl ReportQuery {
    pub fn parse(raw: &RawReportQuery) -> Result<Self> {
        let world = BoundingBox::world();
        let bbox = BoundingBox::new(
            param(&raw.min_lon, "min_lon")?.unwrap_or(world.min_lon),
            param(&raw.min_lat, "min_lat")?.unwrap_or(world.min_lat),
            param(&raw.max_lon, "max_lon")?.unwrap_or(world.max_lon),
            param(&raw.max_lat, "max_lat")?.unwrap_or(world.max_lat),
        )?;

        let days = param(&raw.days, "days")?.unwrap_or(DEFAULT_DAYS);
        if !(1..=MAX_DAYS).contains(&days) {
            return Err(NapulitaError::invalid(format!(
                "days must be between 1 and {MAX_DAYS}"
            )));
        }

        let limit = param(&raw.limit, "limit")?.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(NapulitaError::invalid(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        Ok(Self {
            bbox,
            days,
            status: param(&raw.status, "status")?,
            limit,
            offset: param(&raw.offset, "offset")?.unwrap_or(0),
        })
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    pub timeframe: Option<String>,
    pub limit: Option<String>,
}

impl LeaderboardQuery {
    pub fn parse(&self) -> Result<(Period, usize)> {
        let period = param(&self.timeframe, "timeframe")?.unwrap_or(Period::AllTime);
        let limit = param(&self.limit, "limit")?.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
        if limit == 0 || limit > MAX_LEADERBOARD_LIMIT {
            return Err(NapulitaError::invalid(format!(
                "limit must be between 1 and {MAX_LEADERBOARD_LIMIT}"
            )));
        }
        Ok((period, limit))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateReportRequest {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub category: Option<String>,
    pub note: Option<String>,
    #[serde(alias = "photoRef")]
    pub photo_ref: Option<String>,
}

impl CreateReportRequest {
    pub fn into_command(self) -> Result<CreateReport> {
        let mut missing = Vec::new();
        if self.lat.is_none() {
            missing.push("lat");
        }
        if self.lon.is_none() {
            missing.push("lon");
        }
        if blank(&self.category) {
            missing.push("category");
        }
        if blank(&self.photo_ref) {
            missing.push("photo_ref");
        }
        let (Some(lat), Some(lon), Some(category), Some(photo_ref)) =
            (self.lat, self.lon, self.category, self.photo_ref)
        else {
            return Err(missing_fields(&missing));
        };
        if !missing.is_empty() {
            return Err(missing_fields(&missing));
        }

        Ok(CreateReport {
            location: GeoPoint::new(lat, lon),
            category: Category::from_str(&category)?,
            note: self.note,
            before_photo_ref: photo_ref,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanupRequest {
    #[serde(alias = "afterPhotoRef")]
    pub after_photo_ref: Option<String>,
    #[serde(alias = "afterLat")]
    pub after_lat: Option<f64>,
    #[serde(alias = "afterLon")]
    pub after_lon: Option<f64>,
}

impl CleanupRequest {
    pub fn validate(self) -> Result<(String, GeoPoint)> {
        let mut missing = Vec::new();
        if blank(&self.after_photo_ref) {
            missing.push("after_photo_ref");
        }
        if self.after_lat.is_none() {
            missing.push("after_lat");
        }
        if self.after_lon.is_none() {
            missing.push("after_lon");
        }
        match (self.after_photo_ref, self.after_lat, self.after_lon) {
            (Some(photo), Some(lat), Some(lon)) if missing.is_empty() => {
                Ok((photo, GeoPoint::new(lat, lon)))
            }
            _ => Err(missing_fields(&missing)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentRequest {
    pub body: Option<String>,
    #[serde(alias = "parentId")]
    pub parent_id: Option<i64>,
}

// --- Views ---

/// A report as returned to callers, with photo references resolved to URLs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub lat: f64,
    pub lon: f64,
    pub category: Category,
    pub note: Option<String>,
    pub status: ReportStatus,
    pub claimant_id: Option<UserId>,
    pub before_photo_url: String,
    pub after_photo_url: Option<String>,
    pub after_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub cleaned_at: Option<DateTime<Utc>>,
}

// --- Gateway ---

pub struct QueryGateway {
    engine: Arc<LifecycleEngine>,
    retry: RetryConfig,
}

impl QueryGateway {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self {
            engine,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &Arc<LifecycleEngine> {
        &self.engine
    }

    pub async fn query_reports(&self, raw: &RawReportQuery) -> Result<Vec<ReportView>> {
        let query = ReportQuery::parse(raw)?;
        let since = query.since(self.engine.clock().now());
        let ids = self
            .engine
            .index()
            .query(&query.bbox, since, query.status)
            .await?;
        let total = ids.len();
        let page: Vec<ReportId> = ids
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        debug!(total, returned = page.len(), days = query.days, "Report query");

        let reports = self.engine.store().get_reports(&page).await?;
        Ok(reports.iter().map(|r| self.view(r)).collect())
    }

    pub async fn get_report(&self, id: ReportId) -> Result<ReportView> {
        let report = self.engine.get_report(id).await?;
        Ok(self.view(&report))
    }

    pub async fn create_report(
        &self,
        actor: &Actor,
        request: CreateReportRequest,
    ) -> Result<ReportId> {
        let command = request.into_command()?;
        let engine = &self.engine;
        with_retry(&self.retry, move || {
            engine.create_report(actor, command.clone())
        })
        .await
    }

    pub async fn claim_report(&self, actor: &Actor, id: ReportId) -> Result<bool> {
        self.engine.claim_report(actor, id).await
    }

    pub async fn release_claim(&self, actor: &Actor, id: ReportId) -> Result<()> {
        self.engine.release_claim(actor, id).await
    }

    pub async fn submit_cleanup(
        &self,
        actor: &Actor,
        id: ReportId,
        request: CleanupRequest,
    ) -> Result<bool> {
        let (photo, location) = request.validate()?;
        let engine = &self.engine;
        let photo = photo.as_str();
        with_retry(&self.retry, move || {
            engine.submit_cleanup(actor, id, photo, location)
        })
        .await
    }

    pub async fn mark_invalid(&self, actor: &Actor, id: ReportId) -> Result<bool> {
        self.engine.mark_invalid(actor, id).await
    }

    pub async fn post_comment(
        &self,
        actor: &Actor,
        id: ReportId,
        request: CommentRequest,
    ) -> Result<CommentId> {
        let body = request.body.unwrap_or_default();
        self.engine
            .post_comment(actor, id, &body, request.parent_id.map(CommentId))
            .await
    }

    pub async fn list_comments(&self, id: ReportId) -> Result<Vec<Comment>> {
        self.engine.list_comments(id).await
    }

    pub async fn leaderboard(&self, query: &LeaderboardQuery) -> Result<Vec<LeaderboardEntry>> {
        let (period, limit) = query.parse()?;
        Ok(self
            .engine
            .scoring()
            .leaderboard(period, limit, self.engine.clock().now())
            .await)
    }

    fn view(&self, report: &Report) -> ReportView {
        ReportView {
            id: report.id,
            reporter_id: report.reporter_id,
            lat: report.location.lat,
            lon: report.location.lon,
            category: report.category,
            note: report.note.clone(),
            status: report.status,
            claimant_id: report.claimant_id,
            before_photo_url: self.engine.photo_url(&report.before_photo_ref),
            after_photo_url: report
                .after_photo_ref
                .as_deref()
                .map(|r| self.engine.photo_url(r)),
            after_location: report.after_location,
            created_at: report.created_at,
            claimed_at: report.claimed_at,
            cleaned_at: report.cleaned_at,
        }
    }
}

// --- Helpers ---

/// Parse an optional string parameter. `None` and blank strings are absent.
fn param<T: FromStr>(raw: &Option<String>, name: &str) -> Result<Option<T>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| NapulitaError::invalid(format!("{name} is not valid: {value}"))),
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn missing_fields(fields: &[&str]) -> NapulitaError {
    NapulitaError::invalid(format!("missing required fields: {}", fields.join(", ")))
}
