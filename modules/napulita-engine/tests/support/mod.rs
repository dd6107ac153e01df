//! In-memory wiring shared by the engine tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use napulita_common::{Actor, Category, EngineConfig, GeoPoint, ManualClock, ReportId};
use napulita_engine::{CreateReport, LifecycleEngine, StaticPhotoStore};
use napulita_geo::GeohashIndex;
use napulita_scoring::{CategoryMultiplierPolicy, MemoryScoreLedger, Scoring};
use napulita_store::MemoryReportStore;

/// Piazza del Plebiscito.
pub const PLEBISCITO: GeoPoint = GeoPoint {
    lat: 40.8359,
    lon: 14.2488,
};

/// Roughly one metre of latitude, in degrees.
pub const METRE_LAT: f64 = 1.0 / 111_320.0;

pub struct Harness {
    pub engine: Arc<LifecycleEngine>,
    pub store: Arc<MemoryReportStore>,
    pub index: Arc<GeohashIndex>,
    pub photos: Arc<StaticPhotoStore>,
    pub ledger: Arc<MemoryScoreLedger>,
    pub scoring: Arc<Scoring>,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    // A Wednesday, mid ISO week.
    Utc.with_ymd_and_hms(2024, 9, 18, 10, 0, 0).unwrap()
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default(), StaticPhotoStore::new()).await
}

pub async fn harness_with(config: EngineConfig, photos: StaticPhotoStore) -> Harness {
    let store = Arc::new(MemoryReportStore::new());
    let index = Arc::new(GeohashIndex::new());
    let photos = Arc::new(photos);
    let ledger = Arc::new(MemoryScoreLedger::new());
    let scoring = Arc::new(
        Scoring::load(ledger.clone(), Arc::new(CategoryMultiplierPolicy::default()))
            .await
            .unwrap(),
    );
    let clock = Arc::new(ManualClock::new(start_time()));

    let engine = LifecycleEngine::new(
        store.clone(),
        index.clone(),
        photos.clone(),
        scoring.clone(),
        config,
    )
    .with_clock(clock.clone());

    Harness {
        engine: Arc::new(engine),
        store,
        index,
        photos,
        ledger,
        scoring,
        clock,
    }
}

pub fn user() -> Actor {
    Actor::user(Uuid::new_v4())
}

pub fn north_of(point: GeoPoint, metres: f64) -> GeoPoint {
    GeoPoint::new(point.lat + metres * METRE_LAT, point.lon)
}

impl Harness {
    /// Create an open report at `location` with a known before photo.
    pub async fn report_at(&self, reporter: &Actor, location: GeoPoint, category: Category) -> ReportId {
        let photo = format!("before/{}.jpg", Uuid::new_v4());
        self.photos.add(photo.clone());
        self.engine
            .create_report(
                reporter,
                CreateReport {
                    location,
                    category,
                    note: Some("sacchetti vicino alla panchina".into()),
                    before_photo_ref: photo,
                },
            )
            .await
            .unwrap()
    }

    pub fn after_photo(&self) -> String {
        let photo = format!("after/{}.jpg", Uuid::new_v4());
        self.photos.add(photo.clone());
        photo
    }
}
