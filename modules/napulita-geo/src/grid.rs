//! Geohash-bucketed in-memory index.
//!
//! Reports are bucketed into geohash-5 cells (~4.9km x 4.9km). A box query
//! enumerates the cells the box overlaps and filters their entries exactly;
//! when the box overlaps more cells than are populated (e.g. a whole-world
//! query) it scans the populated buckets instead.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use napulita_common::{BoundingBox, GeoPoint, ReportId, ReportStatus, Result};

use crate::index::{sort_most_recent_first, GeoIndex, IndexEntry};

const PRECISION: usize = 5;
// 25 bits at precision 5: 13 for longitude, 12 for latitude.
const LON_CELLS: i64 = 1 << 13;
const LAT_CELLS: i64 = 1 << 12;
const CELL_LON_DEG: f64 = 360.0 / LON_CELLS as f64;
const CELL_LAT_DEG: f64 = 180.0 / LAT_CELLS as f64;

#[derive(Default)]
struct Grid {
    cells: HashMap<String, Vec<IndexEntry>>,
    cell_of: HashMap<ReportId, String>,
}

#[derive(Default)]
pub struct GeohashIndex {
    grid: RwLock<Grid>,
}

impl GeohashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from existing entries (e.g. at startup).
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Self {
        let index = Self::new();
        {
            let mut grid = index.write();
            for entry in entries {
                grid.put(entry);
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.read().cell_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Grid> {
        self.grid.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Grid> {
        self.grid.write().unwrap_or_else(|e| e.into_inner())
    }

    fn search(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
        status: Option<ReportStatus>,
    ) -> Vec<ReportId> {
        let grid = self.read();
        let (col_lo, row_lo) = cell_coords(bbox.min_lon, bbox.min_lat);
        let (col_hi, row_hi) = cell_coords(bbox.max_lon, bbox.max_lat);
        // One extra ring: geohash::encode can place a point a few ULPs from
        // a cell edge in the neighbouring cell.
        let (col_lo, row_lo) = ((col_lo - 1).max(0), (row_lo - 1).max(0));
        let (col_hi, row_hi) = (
            (col_hi + 1).min(LON_CELLS - 1),
            (row_hi + 1).min(LAT_CELLS - 1),
        );
        let covering = (col_hi - col_lo + 1) * (row_hi - row_lo + 1);

        let mut hits: Vec<IndexEntry> = if covering as usize > grid.cells.len() {
            debug!(covering, buckets = grid.cells.len(), "Box wider than populated grid, scanning buckets");
            grid.cells
                .values()
                .flatten()
                .filter(|e| e.matches(bbox, since, status))
                .cloned()
                .collect()
        } else {
            let mut hits = Vec::new();
            for col in col_lo..=col_hi {
                for row in row_lo..=row_hi {
                    let Some(hash) = cell_hash(col, row) else {
                        continue;
                    };
                    if let Some(bucket) = grid.cells.get(&hash) {
                        hits.extend(
                            bucket
                                .iter()
                                .filter(|e| e.matches(bbox, since, status))
                                .cloned(),
                        );
                    }
                }
            }
            hits
        };

        sort_most_recent_first(&mut hits);
        hits.into_iter().map(|e| e.id).collect()
    }
}

impl Grid {
    fn put(&mut self, entry: IndexEntry) {
        let Some(hash) = encode(&entry.location) else {
            return;
        };
        self.remove(entry.id);
        self.cell_of.insert(entry.id, hash.clone());
        self.cells.entry(hash).or_default().push(entry);
    }

    fn remove(&mut self, id: ReportId) {
        if let Some(hash) = self.cell_of.remove(&id) {
            if let Some(bucket) = self.cells.get_mut(&hash) {
                bucket.retain(|e| e.id != id);
                if bucket.is_empty() {
                    self.cells.remove(&hash);
                }
            }
        }
    }
}

#[async_trait]
impl GeoIndex for GeohashIndex {
    async fn insert(&self, entry: IndexEntry) -> Result<()> {
        entry.location.validate()?;
        self.write().put(entry);
        Ok(())
    }

    async fn update_status(&self, id: ReportId, status: ReportStatus) -> Result<()> {
        let mut grid = self.write();
        let Some(hash) = grid.cell_of.get(&id).cloned() else {
            return Ok(());
        };
        if let Some(entry) = grid
            .cells
            .get_mut(&hash)
            .and_then(|bucket| bucket.iter_mut().find(|e| e.id == id))
        {
            entry.status = status;
        }
        Ok(())
    }

    async fn query(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportId>> {
        Ok(self.search(bbox, since, status))
    }
}

fn encode(point: &GeoPoint) -> Option<String> {
    geohash::encode(
        geohash::Coord {
            x: point.lon,
            y: point.lat,
        },
        PRECISION,
    )
    .ok()
}

/// Grid column/row of the geohash-5 cell containing a point.
fn cell_coords(lon: f64, lat: f64) -> (i64, i64) {
    let col = (((lon + 180.0) / CELL_LON_DEG).floor() as i64).clamp(0, LON_CELLS - 1);
    let row = (((lat + 90.0) / CELL_LAT_DEG).floor() as i64).clamp(0, LAT_CELLS - 1);
    (col, row)
}

fn cell_hash(col: i64, row: i64) -> Option<String> {
    let center = GeoPoint {
        lon: -180.0 + (col as f64 + 0.5) * CELL_LON_DEG,
        lat: -90.0 + (row as f64 + 0.5) * CELL_LAT_DEG,
    };
    encode(&center)
}
