//! Report lifecycle: creation, exclusive claims, verified cleanups,
//! moderation, threaded comments, and claim expiry.
//!
//! ```text
//! open ──claim──▶ claimed ──cleanup──▶ cleaned
//!   │               │  ▲
//!   │               │  └─release / expiry── (back to open)
//!   └──invalid──▶ invalid ◀──invalid──┘
//! ```

pub mod comments;
pub mod lifecycle;
pub mod photos;
pub mod sweeper;

pub use lifecycle::{CreateReport, LifecycleEngine};
pub use photos::{AcceptingPhotoStore, HttpPhotoStore, PhotoStore, StaticPhotoStore};
pub use sweeper::{spawn_claim_sweeper, SweepStats};
