use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use napulita_common::{NapulitaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Weekly,
    Monthly,
    AllTime,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::AllTime => write!(f, "all_time"),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = NapulitaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "all_time" => Ok(Self::AllTime),
            other => Err(NapulitaError::invalid(format!(
                "timeframe must be weekly, monthly or all_time, got {other}"
            ))),
        }
    }
}

/// Monday of the ISO week containing `ts` (UTC).
pub fn week_start(ts: DateTime<Utc>) -> NaiveDate {
    let day = ts.date_naive();
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// First day of the calendar month containing `ts` (UTC).
pub fn month_start(ts: DateTime<Utc>) -> NaiveDate {
    let day = ts.date_naive();
    day.with_day(1).unwrap_or(day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_starts_on_monday() {
        // Sunday 2024-03-10 belongs to the week of Monday 2024-03-04.
        let sunday = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        assert_eq!(week_start(sunday), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());

        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        assert_eq!(week_start(monday), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }

    #[test]
    fn iso_week_can_straddle_years() {
        // 2025-01-01 is a Wednesday; its ISO week starts 2024-12-30.
        let new_year = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            week_start(new_year),
            NaiveDate::from_ymd_opt(2024, 12, 30).unwrap()
        );
        assert_eq!(
            month_start(new_year),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }

    #[test]
    fn parse_period() {
        assert_eq!("weekly".parse::<Period>().unwrap(), Period::Weekly);
        assert_eq!("all_time".parse::<Period>().unwrap(), Period::AllTime);
        assert!("daily".parse::<Period>().is_err());
    }
}
