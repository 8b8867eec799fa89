use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Store key for the serialized entry collection.
pub const ENTRIES_KEY: &str = "water_intake_data";
/// Store key for the daily target in milliliters.
pub const TARGET_KEY: &str = "daily_water_target";
/// Store key for the reminder interval in minutes.
pub const INTERVAL_KEY: &str = "notification_interval";

pub const DEFAULT_DAILY_TARGET: i64 = 2800;
pub const DEFAULT_REMINDER_INTERVAL: i64 = 60;

/// Largest single drink accepted, in milliliters.
pub const MAX_AMOUNT: i64 = 10_000;
/// Longest reminder interval accepted: one year, in minutes.
pub const MAX_REMINDER_INTERVAL: i64 = 525_600;

/// Quick-add amounts offered when logging, in milliliters.
pub const PRESET_AMOUNTS: &[i64] = &[100, 200, 250, 300, 500];

/// Default history window: today plus the 13 days before it.
pub const HISTORY_DAYS: u32 = 14;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterIntakeEntry {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Milliliters, always positive.
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl WaterIntakeEntry {
    #[must_use]
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp).single()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewWaterIntakeEntry {
    pub amount: i64,
    /// Defaults to the ledger clock's "now" when absent.
    pub timestamp: Option<i64>,
    pub note: Option<String>,
}

impl NewWaterIntakeEntry {
    #[must_use]
    pub fn new(amount: i64) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    /// Newest first.
    pub entries: Vec<WaterIntakeEntry>,
    pub total: i64,
    pub target: i64,
    pub remaining: i64,
    pub progress: f64,
    pub percentage: u8,
}

impl DaySummary {
    #[must_use]
    pub fn new(date: NaiveDate, mut entries: Vec<WaterIntakeEntry>, target: i64) -> Self {
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let total = sum_amounts(&entries);
        let progress = progress(total, target);
        Self {
            date,
            entries,
            total,
            target,
            remaining: (target - total).max(0),
            progress,
            percentage: percentage(progress),
        }
    }

    #[must_use]
    pub fn goal_reached(&self) -> bool {
        self.total >= self.target
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayTotal {
    pub date: NaiveDate,
    pub total: i64,
    pub entry_count: usize,
}

/// Sum of entry amounts. Saturates, since stored records are not re-validated on read.
#[must_use]
pub fn sum_amounts<'a>(entries: impl IntoIterator<Item = &'a WaterIntakeEntry>) -> i64 {
    entries
        .into_iter()
        .fold(0_i64, |sum, e| sum.saturating_add(e.amount))
}

/// Fraction of the target reached, clamped to `0.0..=1.0`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress(total: i64, target: i64) -> f64 {
    if target <= 0 {
        return 0.0;
    }
    (total as f64 / target as f64).clamp(0.0, 1.0)
}

#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn percentage(progress: f64) -> u8 {
    (progress * 100.0).round() as u8
}

pub fn validate_amount(amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(Error::validation("Please enter a valid amount of water in ml"));
    }
    if amount > MAX_AMOUNT {
        return Err(Error::validation(format!(
            "A single drink cannot be more than {MAX_AMOUNT} ml"
        )));
    }
    Ok(amount)
}

pub fn validate_target(target: i64) -> Result<i64> {
    if target <= 0 {
        return Err(Error::validation("Daily target must be greater than 0 ml"));
    }
    Ok(target)
}

pub fn validate_interval(minutes: i64) -> Result<i64> {
    if minutes <= 0 {
        return Err(Error::validation(
            "Reminder interval must be greater than 0 minutes",
        ));
    }
    if minutes > MAX_REMINDER_INTERVAL {
        return Err(Error::validation(format!(
            "Reminder interval cannot be more than {MAX_REMINDER_INTERVAL} minutes"
        )));
    }
    Ok(minutes)
}

/// Parse user input such as `"250"` or `"250ml"` into a validated amount.
pub fn parse_amount(input: &str) -> Result<i64> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_suffix("ml")
        .or_else(|| trimmed.strip_suffix("ML"))
        .unwrap_or(trimmed)
        .trim();
    let amount: i64 = digits.parse().map_err(|_| {
        Error::validation(format!(
            "Invalid amount '{input}'. Use a number like '250' or '250ml'"
        ))
    })?;
    validate_amount(amount)
}

/// Closed millisecond interval `[start, end]` covering `date` in local time.
#[must_use]
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = local_midnight_millis(date);
    let end = date
        .succ_opt()
        .map_or(i64::MAX, |next| local_midnight_millis(next) - 1);
    (start, end)
}

/// Local calendar date of a millisecond timestamp.
#[must_use]
pub fn local_date(timestamp: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(timestamp)
        .single()
        .map(|dt| dt.date_naive())
}

fn local_midnight_millis(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    first_valid_instant(midnight, |naive| {
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp_millis())
    })
    .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
}

/// First wall time at or after `start` that `resolve` maps to an instant, probing in 15 minute
/// steps for up to a day. A DST jump can skip midnight itself.
fn first_valid_instant(
    start: NaiveDateTime,
    resolve: impl Fn(NaiveDateTime) -> Option<i64>,
) -> Option<i64> {
    (0..96).find_map(|step| resolve(start + TimeDelta::minutes(15 * step)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_millis(date: NaiveDate, h: u32, m: u32) -> i64 {
        Local
            .from_local_datetime(&date.and_hms_opt(h, m, 0).unwrap())
            .earliest()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(250).unwrap(), 250);
        assert!(validate_amount(0).unwrap_err().is_validation());
        assert!(validate_amount(-5).unwrap_err().is_validation());
        assert_eq!(validate_amount(MAX_AMOUNT).unwrap(), MAX_AMOUNT);
        assert!(validate_amount(MAX_AMOUNT + 1).unwrap_err().is_validation());
        assert!(validate_amount(i64::MAX).unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_interval_bounds() {
        assert_eq!(validate_interval(1).unwrap(), 1);
        assert_eq!(
            validate_interval(MAX_REMINDER_INTERVAL).unwrap(),
            MAX_REMINDER_INTERVAL
        );
        assert!(validate_interval(0).unwrap_err().is_validation());
        assert!(
            validate_interval(MAX_REMINDER_INTERVAL + 1)
                .unwrap_err()
                .is_validation()
        );
        assert!(validate_interval(i64::MAX / 2).unwrap_err().is_validation());
    }

    #[test]
    fn test_sum_amounts_saturates() {
        let huge = |id: &str| WaterIntakeEntry {
            id: id.into(),
            timestamp: 0,
            amount: i64::MAX,
            note: None,
        };
        assert_eq!(sum_amounts(&[huge("a"), huge("b")]), i64::MAX);
        assert_eq!(sum_amounts(&Vec::new()), 0);
    }

    #[test]
    fn test_first_valid_instant_skips_gap_after_midnight() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_time(NaiveTime::MIN);
        let one_am = midnight + TimeDelta::hours(1);
        // Wall times before 01:00 do not exist, as when clocks jump forward at midnight
        let resolve = |naive: NaiveDateTime| {
            (naive >= one_am).then(|| naive.and_utc().timestamp_millis() - 3_600_000)
        };

        assert_eq!(
            first_valid_instant(midnight, resolve),
            Some(one_am.and_utc().timestamp_millis() - 3_600_000)
        );
        assert_eq!(first_valid_instant(midnight, |_| None), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("250").unwrap(), 250);
        assert_eq!(parse_amount(" 300ml ").unwrap(), 300);
        assert_eq!(parse_amount("500 ml").unwrap(), 500);
        assert!(parse_amount("abc").unwrap_err().is_validation());
        assert!(parse_amount("").unwrap_err().is_validation());
        assert!(parse_amount("12.5").unwrap_err().is_validation());
        assert!(parse_amount("-100").unwrap_err().is_validation());
    }

    #[test]
    fn test_day_bounds_cover_whole_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let (start, end) = day_bounds(date);
        let next = date.succ_opt().unwrap();
        let (next_start, _) = day_bounds(next);

        assert_eq!(end + 1, next_start);
        assert!(start <= local_millis(date, 0, 0));
        assert!(end >= local_millis(date, 23, 59));
        assert_eq!(local_date(start), Some(date));
        assert_eq!(local_date(end), Some(date));
    }

    #[test]
    fn test_summary_sorts_newest_first_and_clamps_progress() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let entries = vec![
            WaterIntakeEntry {
                id: "a".into(),
                timestamp: local_millis(date, 8, 0),
                amount: 2000,
                note: None,
            },
            WaterIntakeEntry {
                id: "b".into(),
                timestamp: local_millis(date, 12, 0),
                amount: 1000,
                note: Some("lunch".into()),
            },
        ];

        let summary = DaySummary::new(date, entries, 2800);
        assert_eq!(summary.entries[0].id, "b");
        assert_eq!(summary.total, 3000);
        assert_eq!(summary.remaining, 0);
        assert!((summary.progress - 1.0).abs() < f64::EPSILON);
        assert_eq!(summary.percentage, 100);
        assert!(summary.goal_reached());
    }

    #[test]
    fn test_progress_percentage_rounding() {
        assert_eq!(percentage(progress(550, 2800)), 20);
        assert_eq!(percentage(progress(0, 2800)), 0);
        assert!((progress(100, 0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entry_json_omits_missing_note() {
        let entry = WaterIntakeEntry {
            id: "1".into(),
            timestamp: 1_718_438_400_000,
            amount: 250,
            note: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"id":"1","timestamp":1718438400000,"amount":250}"#);

        let parsed: WaterIntakeEntry =
            serde_json::from_str(r#"{"id":"2","timestamp":5,"amount":100,"note":"tea"}"#).unwrap();
        assert_eq!(parsed.note.as_deref(), Some("tea"));
    }
}
