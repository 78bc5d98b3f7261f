//! Natural-language temporal reference parsing.
//!
//! Maps phrases like "yesterday" or "last 3 days" to a concrete
//! `[start, end]` range used to filter session listings. Matching is
//! case-insensitive, first-match wins, and the pattern order is load-bearing:
//! numeric patterns ("last N days") run before generic keywords ("recently")
//! so the specific phrase is never shadowed.
//!
//! The current time is a parameter, never a system-clock call, so callers
//! can fix "now" and assert exact boundaries.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;

/// Minimum confidence at which callers should act on a parsed range.
/// Below this, a query merely *containing* a time word is treated as
/// non-temporal rather than truncating history over-eagerly.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// A concrete date range derived from a natural-language phrase.
///
/// Invariant: `start <= end`. `confidence` reflects pattern specificity
/// (exact keywords score 1.0, fuzzy ones below 0.8) so callers can threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalRange {
    /// Inclusive range start
    pub start: DateTime<Utc>,
    /// Inclusive range end
    pub end: DateTime<Utc>,
    /// Human-readable label for the matched phrase ("yesterday", "last 3 days")
    pub description: String,
    /// Pattern-match specificity in `[0.0, 1.0]`
    pub confidence: f64,
}

static LAST_N_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"last\s+(\d{1,3})\s+days?").expect("static regex"));
static N_DAYS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s+days?\s+ago").expect("static regex"));
static LAST_N_WEEKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"last\s+(\d{1,3})\s+weeks?").expect("static regex"));

/// Parse a query for a temporal reference against the supplied clock.
///
/// Returns `None` when no pattern matches; the caller treats the query as
/// non-temporal. Running this twice with the same `now` yields identical
/// ranges.
#[must_use]
pub fn parse(query: &str, now: DateTime<Utc>) -> Option<TemporalRange> {
    let q = query.to_lowercase();

    // Numeric patterns first: "last 3 days" must not fall through to
    // "recently", and "3 days ago" must not fall through to "yesterday".
    if let Some(n) = capture_n(&LAST_N_DAYS, &q) {
        return Some(TemporalRange {
            start: now - Duration::days(n),
            end: now,
            description: format!("last {n} days"),
            confidence: 1.0,
        });
    }
    if let Some(n) = capture_n(&N_DAYS_AGO, &q) {
        let day = now - Duration::days(n);
        return Some(TemporalRange {
            start: start_of_day(day),
            end: end_of_day(day),
            description: format!("{n} days ago"),
            confidence: 1.0,
        });
    }
    if let Some(n) = capture_n(&LAST_N_WEEKS, &q) {
        return Some(TemporalRange {
            start: now - Duration::days(7 * n),
            end: now,
            description: format!("last {n} weeks"),
            confidence: 0.9,
        });
    }

    if q.contains("yesterday") || q.contains("last night") {
        let day = now - Duration::days(1);
        return Some(TemporalRange {
            start: start_of_day(day),
            end: end_of_day(day),
            description: "yesterday".to_string(),
            confidence: 1.0,
        });
    }

    if q.contains("today")
        || q.contains("this morning")
        || q.contains("this afternoon")
        || q.contains("this evening")
    {
        return Some(TemporalRange {
            start: start_of_day(now),
            end: now,
            description: "today".to_string(),
            confidence: 1.0,
        });
    }

    // "last week" before "this week" is irrelevant for shadowing, but both
    // must run before "recently" catches nothing they should have.
    if q.contains("last week") {
        let week = (now - Duration::days(7)).date_naive().week(Weekday::Mon);
        return Some(TemporalRange {
            start: start_of_date(week.first_day()),
            end: end_of_date(week.last_day()),
            description: "last week".to_string(),
            confidence: 0.9,
        });
    }

    if q.contains("this week") {
        let week = now.date_naive().week(Weekday::Mon);
        return Some(TemporalRange {
            start: start_of_date(week.first_day()),
            end: now,
            description: "this week".to_string(),
            confidence: 1.0,
        });
    }

    if q.contains("last month") {
        let (year, month) = previous_month(now.year(), now.month());
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let first_of_current = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;
        let last = first_of_current.pred_opt()?;
        return Some(TemporalRange {
            start: start_of_date(first),
            end: end_of_date(last),
            description: "last month".to_string(),
            confidence: 0.8,
        });
    }

    if q.contains("recently") || q.contains("lately") || q.contains("past few days") {
        return Some(TemporalRange {
            start: now - Duration::days(7),
            end: now,
            description: "recently".to_string(),
            confidence: 0.7,
        });
    }

    None
}

fn capture_n(re: &Regex, query: &str) -> Option<i64> {
    re.captures(query)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .filter(|n| *n > 0)
}

/// 00:00:00.000 of the given instant's calendar day
fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_date(dt.date_naive())
}

/// 23:59:59.999999 of the given instant's calendar day
fn end_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    end_of_date(dt.date_naive())
}

fn start_of_date(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight exists for every date")
        .and_utc()
}

fn end_of_date(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
        .expect("end of day exists for every date")
        .and_utc()
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}
