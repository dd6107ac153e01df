pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, EngineConfig, GeoIndexKind};
pub use error::{ErrorKind, NapulitaError, Result};
pub use geo::{haversine_distance_meters, BoundingBox, GeoPoint};
pub use types::*;
