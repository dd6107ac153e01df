use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use napulita_common::{ReportId, UserId};

use crate::ledger::{ScoreEvent, ScoreEventKind};
use crate::period::{month_start, week_start, Period};

/// Points within one window (a week, a month, or all time).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub points: i64,
    pub reports_cleaned: u32,
    /// Latest event time among those that moved the total. Earlier wins ties.
    pub reached_at: Option<DateTime<Utc>>,
}

impl Tally {
    fn apply(&mut self, points: i64, cleaned: bool, at: DateTime<Utc>) {
        if points != 0 || self.reached_at.is_none() {
            self.points += points;
            // Credits may be applied out of time order.
            self.reached_at = self.reached_at.max(Some(at));
        }
        if cleaned {
            self.reports_cleaned += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    pub user_id: UserId,
    pub all_time: Tally,
    /// Keyed by the Monday starting each ISO week.
    pub weekly: BTreeMap<NaiveDate, Tally>,
    /// Keyed by the first day of each month.
    pub monthly: BTreeMap<NaiveDate, Tally>,
}

impl ScoreCard {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            all_time: Tally::default(),
            weekly: BTreeMap::new(),
            monthly: BTreeMap::new(),
        }
    }

    pub fn cumulative_points(&self) -> i64 {
        self.all_time.points
    }

    pub fn tally_for(&self, period: Period, now: DateTime<Utc>) -> Option<&Tally> {
        match period {
            Period::AllTime => Some(&self.all_time),
            Period::Weekly => self.weekly.get(&week_start(now)),
            Period::Monthly => self.monthly.get(&month_start(now)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: UserId,
    pub points: i64,
    pub reports_cleaned: u32,
}

/// Projection of the score ledger.
#[derive(Debug, Default)]
pub struct Scoreboard {
    cards: HashMap<UserId, ScoreCard>,
    credited: HashSet<ReportId>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ScoreEvent>) -> Self {
        let mut board = Self::new();
        for event in events {
            board.apply(event);
        }
        board
    }

    pub fn is_credited(&self, report_id: ReportId) -> bool {
        self.credited.contains(&report_id)
    }

    /// Fold one event into the projection. A second cleanup event for the same
    /// report is ignored.
    pub fn apply(&mut self, event: &ScoreEvent) {
        let cleaned = match &event.kind {
            ScoreEventKind::Cleanup { report_id, .. } => {
                if !self.credited.insert(*report_id) {
                    return;
                }
                true
            }
            ScoreEventKind::Correction { .. } => false,
        };

        let card = self
            .cards
            .entry(event.user_id)
            .or_insert_with(|| ScoreCard::new(event.user_id));
        let at = event.occurred_at;
        card.all_time.apply(event.points, cleaned, at);
        card.weekly
            .entry(week_start(at))
            .or_default()
            .apply(event.points, cleaned, at);
        card.monthly
            .entry(month_start(at))
            .or_default()
            .apply(event.points, cleaned, at);
    }

    pub fn card(&self, user_id: UserId) -> Option<&ScoreCard> {
        self.cards.get(&user_id)
    }

    /// Ranked by points descending; ties go to whoever reached the total
    /// first, then to the lower user id.
    pub fn leaderboard(
        &self,
        period: Period,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(UserId, &Tally)> = self
            .cards
            .values()
            .filter_map(|card| card.tally_for(period, now).map(|t| (card.user_id, t)))
            .collect();

        rows.sort_by(|(a_id, a), (b_id, b)| {
            b.points
                .cmp(&a.points)
                .then_with(|| match (a.reached_at, b.reached_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a_id.cmp(b_id))
        });

        rows.into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (user_id, tally))| LeaderboardEntry {
                rank: i as u32 + 1,
                user_id,
                points: tally.points,
                reports_cleaned: tally.reports_cleaned,
            })
            .collect()
    }
}
