//! Point accrual and leaderboards.
//!
//! Every award or correction is a [`ScoreEvent`] appended to a [`ScoreLedger`].
//! The [`Scoreboard`] is a projection of that ledger with per-week and
//! per-month buckets, so leaderboard reads never rescan event history. It
//! follows the ledger by position, picking up events other instances append.

pub mod ledger;
pub mod period;
pub mod policy;
pub mod scoreboard;
pub mod scoring;

pub use ledger::{
    LedgerEntry, MemoryScoreLedger, PgScoreLedger, ScoreEvent, ScoreEventKind, ScoreLedger,
};
pub use period::{month_start, week_start, Period};
pub use policy::{CategoryMultiplierPolicy, PointPolicy};
pub use scoreboard::{LeaderboardEntry, ScoreCard, Scoreboard, Tally};
pub use scoring::{spawn_score_refresher, Scoring};
