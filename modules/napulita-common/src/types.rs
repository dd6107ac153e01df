use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NapulitaError, Result};
use crate::geo::GeoPoint;

pub const MAX_NOTE_CHARS: usize = 500;
pub const MAX_COMMENT_CHARS: usize = 2000;

// --- Identifiers ---

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub i64);

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReportId {
    type Err = NapulitaError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(ReportId)
            .map_err(|_| NapulitaError::invalid(format!("invalid report id: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller identity as supplied by the request context. Never resolved here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub is_moderator: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_moderator: false,
        }
    }

    pub fn moderator(user_id: UserId) -> Self {
        Self {
            user_id,
            is_moderator: true,
        }
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DogWaste,
    Trash,
    OverflowingBin,
    BulkyItem,
    CigaretteButts,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::DogWaste,
        Category::Trash,
        Category::OverflowingBin,
        Category::BulkyItem,
        Category::CigaretteButts,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DogWaste => "dog_waste",
            Self::Trash => "trash",
            Self::OverflowingBin => "overflowing_bin",
            Self::BulkyItem => "bulky_item",
            Self::CigaretteButts => "cigarette_butts",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = NapulitaError;

    /// Accepts the canonical names plus the short names older clients send.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "dog_waste" | "dog_poop" => Ok(Self::DogWaste),
            "trash" => Ok(Self::Trash),
            "overflowing_bin" => Ok(Self::OverflowingBin),
            "bulky_item" | "bulky" => Ok(Self::BulkyItem),
            "cigarette_butts" | "butts" => Ok(Self::CigaretteButts),
            "other" => Ok(Self::Other),
            other => Err(NapulitaError::invalid(format!("unknown category: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Claimed,
    Cleaned,
    Invalid,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Open,
        ReportStatus::Claimed,
        ReportStatus::Cleaned,
        ReportStatus::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Claimed => "claimed",
            Self::Cleaned => "cleaned",
            Self::Invalid => "invalid",
        }
    }

    /// The lifecycle graph. Anything not listed here is not a legal edge.
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Open, Claimed)
                | (Open, Invalid)
                | (Claimed, Cleaned)
                | (Claimed, Open)
                | (Claimed, Invalid)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cleaned | Self::Invalid)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = NapulitaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "open" => Ok(Self::Open),
            "claimed" => Ok(Self::Claimed),
            "cleaned" => Ok(Self::Cleaned),
            "invalid" => Ok(Self::Invalid),
            other => Err(NapulitaError::invalid(format!("unknown status: {other}"))),
        }
    }
}

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub location: GeoPoint,
    pub category: Category,
    pub note: Option<String>,
    pub before_photo_ref: String,
    pub status: ReportStatus,
    pub claimant_id: Option<UserId>,
    pub after_photo_ref: Option<String>,
    pub after_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub cleaned_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Check the field-level invariants tied to status.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let has_claimant = self.claimant_id.is_some();
        let should_have_claimant =
            matches!(self.status, ReportStatus::Claimed | ReportStatus::Cleaned);
        if has_claimant != should_have_claimant {
            return Err(format!(
                "report {}: claimant present={has_claimant} with status {}",
                self.id, self.status
            ));
        }

        let has_after = self.after_photo_ref.is_some();
        if has_after != (self.status == ReportStatus::Cleaned) {
            return Err(format!(
                "report {}: after photo present={has_after} with status {}",
                self.id, self.status
            ));
        }

        if self.status == ReportStatus::Cleaned && self.cleaned_at.is_none() {
            return Err(format!("report {}: cleaned without cleaned_at", self.id));
        }
        if self.status == ReportStatus::Claimed && self.claimed_at.is_none() {
            return Err(format!("report {}: claimed without claimed_at", self.id));
        }
        Ok(())
    }

    pub fn is_claimed_by(&self, user_id: UserId) -> bool {
        self.claimant_id == Some(user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub report_id: ReportId,
    pub author_id: UserId,
    pub body: String,
    pub parent_id: Option<CommentId>,
    pub created_at: DateTime<Utc>,
}

/// Trim and bound free text. Returns `None` for blank input.
pub fn normalize_text(raw: &str, max_chars: usize, field: &str) -> Result<Option<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_chars {
        return Err(NapulitaError::invalid(format!(
            "{field} exceeds {max_chars} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}
