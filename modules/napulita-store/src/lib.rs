//! Durable storage for reports and comments.
//!
//! Every status change goes through [`ReportStore::compare_and_set`], a single
//! conditional write scoped to one report. There is no read-then-write path and
//! no delete: reports are archived via status.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryReportStore;
pub use postgres::PgReportStore;
pub use store::{NewComment, NewReport, ReportStore, StatusChange, StatusGuard};
