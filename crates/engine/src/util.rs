//! Internal helpers for calendar arithmetic and input normalization.
//!
//! These utilities are **not** part of the public API (except
//! [`months_between`], re-exported because callers display it).

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use unicode_normalization::UnicodeNormalization;

use crate::{EngineError, ResultEngine};

/// Whole calendar months from `start` to `end`, truncating partial months.
///
/// A month is counted once `start + n months` (chrono month arithmetic, which
/// clamps to the last day of shorter months) is not after `end`. So
/// 2024-01-15 → 2025-01-14 is 11 months, 2024-01-15 → 2025-01-15 is 12 and
/// 2024-01-31 → 2024-02-29 is 1. Returns 0 when `end <= start`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end <= start {
        return 0;
    }
    let mut months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    while months > 0 {
        match start.checked_add_months(Months::new(months as u32)) {
            Some(candidate) if candidate <= end => break,
            _ => months -= 1,
        }
    }
    months.max(0) as u32
}

/// Midnight UTC at the beginning of `date`.
pub(crate) fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Midnight UTC at the beginning of the day after `date`; exclusive upper bound
/// for "through the end of `date`".
pub(crate) fn end_of_day_exclusive(date: NaiveDate) -> DateTime<Utc> {
    match date.succ_opt() {
        Some(next) => start_of_day(next),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// First day of the month `months_back` months before the month of `now`.
pub(crate) fn first_day_of_month_back(now: DateTime<Utc>, months_back: u32) -> NaiveDate {
    let today = now.date_naive();
    let first = today.with_day(1).unwrap_or(today);
    first
        .checked_sub_months(Months::new(months_back))
        .unwrap_or(NaiveDate::MIN)
}

/// Reject a date range whose end is not strictly after its start.
pub(crate) fn ensure_date_order(start: NaiveDate, end: NaiveDate) -> ResultEngine<()> {
    if end <= start {
        return Err(EngineError::InvalidInput(
            "end date must be after start date".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_text(value: &str) -> String {
    value.trim().to_string()
}

/// Comparison key for names: NFKC, lowercase, single spaces.
pub(crate) fn normalize_name_key(value: &str) -> String {
    value
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
