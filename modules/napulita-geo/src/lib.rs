//! Spatial lookup over report coordinates.
//!
//! The engine talks to [`GeoIndex`] only, so the backing structure (in-memory
//! geohash grid, SQL range scan) can be swapped without touching lifecycle code.

pub mod grid;
pub mod index;

pub use grid::GeohashIndex;
pub use index::{GeoIndex, IndexEntry};
