use std::sync::Arc;

use tracing::{debug, info, warn};

use napulita_common::{
    normalize_text, Actor, Category, Clock, EngineConfig, GeoPoint, NapulitaError, Report,
    ReportId, ReportStatus, Result, SystemClock, MAX_NOTE_CHARS,
};
use napulita_geo::GeoIndex;
use napulita_scoring::Scoring;
use napulita_store::store::index_entry;
use napulita_store::{NewReport, ReportStore, StatusChange, StatusGuard};

use crate::photos::PhotoStore;

/// A report as submitted by a reporter.
#[derive(Debug, Clone)]
pub struct CreateReport {
    pub location: GeoPoint,
    pub category: Category,
    pub note: Option<String>,
    pub before_photo_ref: String,
}

/// Owns every report status transition.
pub struct LifecycleEngine {
    store: Arc<dyn ReportStore>,
    index: Arc<dyn GeoIndex>,
    photos: Arc<dyn PhotoStore>,
    scoring: Arc<Scoring>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn ReportStore>,
        index: Arc<dyn GeoIndex>,
        photos: Arc<dyn PhotoStore>,
        scoring: Arc<Scoring>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            index,
            photos,
            scoring,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<dyn GeoIndex> {
        &self.index
    }

    pub fn photos(&self) -> &Arc<dyn PhotoStore> {
        &self.photos
    }

    pub fn scoring(&self) -> &Arc<Scoring> {
        &self.scoring
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Reads ---

    pub async fn get_report(&self, id: ReportId) -> Result<Report> {
        self.store
            .get_report(id)
            .await?
            .ok_or_else(|| NapulitaError::NotFound(format!("report {id}")))
    }

    pub fn photo_url(&self, photo_ref: &str) -> String {
        self.photos.public_url(photo_ref)
    }

    // --- Transitions ---

    pub async fn create_report(&self, actor: &Actor, req: CreateReport) -> Result<ReportId> {
        req.location.validate()?;
        if !self.config.service_region.contains(&req.location) {
            return Err(NapulitaError::invalid(format!(
                "location ({}, {}) is outside the service region",
                req.location.lat, req.location.lon
            )));
        }
        let note = match req.note.as_deref() {
            Some(raw) => normalize_text(raw, MAX_NOTE_CHARS, "note")?,
            None => None,
        };
        let before_photo_ref = required_ref(&req.before_photo_ref, "before photo")?;
        self.confirm_photo(&before_photo_ref).await?;

        let report = self
            .store
            .insert_report(NewReport {
                reporter_id: actor.user_id,
                location: req.location,
                category: req.category,
                note,
                before_photo_ref,
                created_at: self.clock.now(),
            })
            .await?;

        if let Err(e) = self.index.insert(index_entry(&report)).await {
            warn!(report_id = %report.id, error = %e, "Failed to index new report");
        }

        info!(
            report_id = %report.id,
            reporter_id = %actor.user_id,
            category = %report.category,
            "Report created"
        );
        Ok(report.id)
    }

    /// Exactly one of any number of concurrent claims on an open report
    /// returns `true`. Losing a race is `Ok(false)`, not an error.
    pub async fn claim_report(&self, actor: &Actor, id: ReportId) -> Result<bool> {
        let claimed = self
            .store
            .compare_and_set(
                id,
                StatusGuard::status(ReportStatus::Open),
                StatusChange::Claim {
                    claimant: actor.user_id,
                    at: self.clock.now(),
                },
            )
            .await?;

        match claimed {
            Some(report) => {
                self.sync_index(&report).await;
                info!(report_id = %id, claimant_id = %actor.user_id, "Report claimed");
                Ok(true)
            }
            None => {
                let current = self.get_report(id).await?;
                debug!(report_id = %id, status = %current.status, "Claim not applied");
                Ok(false)
            }
        }
    }

    pub async fn release_claim(&self, actor: &Actor, id: ReportId) -> Result<()> {
        let released = self
            .store
            .compare_and_set(
                id,
                StatusGuard::claimed_by(actor.user_id),
                StatusChange::Release,
            )
            .await?;

        match released {
            Some(report) => {
                self.sync_index(&report).await;
                info!(report_id = %id, claimant_id = %actor.user_id, "Claim released");
                Ok(())
            }
            None => {
                let current = self.get_report(id).await?;
                Err(NapulitaError::PermissionDenied(format!(
                    "report {id} is {} and not claimed by this user",
                    current.status
                )))
            }
        }
    }

    /// Verify and record a cleanup. Credits points once per report; a retry
    /// with identical arguments after success returns `true` without a second
    /// award.
    pub async fn submit_cleanup(
        &self,
        actor: &Actor,
        id: ReportId,
        after_photo_ref: &str,
        after_location: GeoPoint,
    ) -> Result<bool> {
        after_location.validate()?;
        let after_photo_ref = required_ref(after_photo_ref, "after photo")?;
        let report = self.get_report(id).await?;

        if report.status == ReportStatus::Cleaned
            && report.is_claimed_by(actor.user_id)
            && report.after_photo_ref.as_deref() == Some(after_photo_ref.as_str())
        {
            debug!(report_id = %id, "Cleanup already recorded");
            self.credit(&report).await?;
            return Ok(true);
        }

        if report.status != ReportStatus::Claimed || !report.is_claimed_by(actor.user_id) {
            return Err(NapulitaError::PermissionDenied(format!(
                "report {id} is {} and not claimed by this user",
                report.status
            )));
        }

        let distance = report.location.distance_meters(&after_location);
        if distance > self.config.cleanup_radius_meters {
            return Err(NapulitaError::ValidationFailed(format!(
                "after photo taken {distance:.0}m from the report, limit is {:.0}m",
                self.config.cleanup_radius_meters
            )));
        }

        self.confirm_photo(&after_photo_ref).await?;

        let cleaned = self
            .store
            .compare_and_set(
                id,
                StatusGuard::claimed_by(actor.user_id),
                StatusChange::Cleanup {
                    after_photo_ref,
                    after_location,
                    at: self.clock.now(),
                },
            )
            .await?;

        let Some(report) = cleaned else {
            debug!(report_id = %id, "Claim changed before cleanup was recorded");
            return Ok(false);
        };

        self.sync_index(&report).await;
        info!(
            report_id = %id,
            claimant_id = %actor.user_id,
            distance_m = distance.round() as i64,
            "Report cleaned"
        );
        self.credit(&report).await?;
        Ok(true)
    }

    /// Moderator-only; irreversible.
    pub async fn mark_invalid(&self, actor: &Actor, id: ReportId) -> Result<bool> {
        if !actor.is_moderator {
            return Err(NapulitaError::PermissionDenied(
                "only moderators can invalidate reports".into(),
            ));
        }

        let invalidated = self
            .store
            .compare_and_set(
                id,
                StatusGuard::any_of(&[ReportStatus::Open, ReportStatus::Claimed]),
                StatusChange::Invalidate,
            )
            .await?;

        match invalidated {
            Some(report) => {
                self.sync_index(&report).await;
                info!(report_id = %id, moderator_id = %actor.user_id, "Report marked invalid");
                Ok(true)
            }
            None => {
                let current = self.get_report(id).await?;
                debug!(report_id = %id, status = %current.status, "Invalidation not applied");
                Ok(false)
            }
        }
    }

    // --- Helpers ---

    async fn credit(&self, report: &Report) -> Result<()> {
        let (Some(claimant), Some(cleaned_at)) = (report.claimant_id, report.cleaned_at) else {
            return Ok(());
        };
        self.scoring
            .record_cleanup(claimant, report.id, report.category, cleaned_at)
            .await?;
        Ok(())
    }

    pub(crate) async fn sync_index(&self, report: &Report) {
        if let Err(e) = self.index.update_status(report.id, report.status).await {
            warn!(report_id = %report.id, error = %e, "Failed to update index status");
        }
    }

    async fn confirm_photo(&self, photo_ref: &str) -> Result<()> {
        let lookup = self.photos.confirm_exists(photo_ref);
        match tokio::time::timeout(self.config.photo_timeout, lookup).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(NapulitaError::ResourceUnavailable(format!(
                "photo {photo_ref} could not be confirmed"
            ))),
            Ok(Err(e)) => {
                warn!(photo_ref, error = %e, "Photo lookup failed");
                Err(NapulitaError::ResourceUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(
                    photo_ref,
                    timeout_ms = self.config.photo_timeout.as_millis() as u64,
                    "Photo lookup timed out"
                );
                Err(NapulitaError::ResourceUnavailable(
                    "photo store timed out".into(),
                ))
            }
        }
    }
}

fn required_ref(raw: &str, what: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NapulitaError::invalid(format!("{what} reference is required")));
    }
    Ok(trimmed.to_string())
}
