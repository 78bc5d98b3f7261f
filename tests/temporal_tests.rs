//! Temporal parser properties: determinism, exact boundaries, precedence.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use pretty_assertions::assert_eq;

use chat_gateway::temporal::{self, CONFIDENCE_THRESHOLD};

/// Wednesday 2024-05-15 14:30:00 UTC
fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 14, 30, 0).unwrap()
}

#[test]
fn yesterday_is_exactly_one_calendar_day_at_full_confidence() {
    let range = temporal::parse("What did we do yesterday?", fixed_now()).unwrap();

    assert_eq!(range.confidence, 1.0);
    assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 5, 14, 0, 0, 0).unwrap());
    assert_eq!(range.start.date_naive(), range.end.date_naive());
    assert!(range.end - range.start > Duration::hours(23));
    assert!(range.end - range.start < Duration::days(1));
}

#[test]
fn parsing_is_deterministic_for_a_fixed_clock() {
    for phrase in ["yesterday", "last 3 days", "last week", "recently"] {
        let a = temporal::parse(phrase, fixed_now()).unwrap();
        let b = temporal::parse(phrase, fixed_now()).unwrap();
        assert_eq!(a, b, "{phrase}");
    }
}

#[test]
fn numeric_patterns_win_over_keywords() {
    // Both "recently" and "last 3 days" appear; the specific pattern wins
    let range = temporal::parse("recently, in the last 3 days", fixed_now()).unwrap();
    assert_eq!(range.description, "last 3 days");
    assert_eq!(range.confidence, 1.0);
    assert_eq!(range.start, fixed_now() - Duration::days(3));

    // "2 days ago" must not collapse into "yesterday" semantics
    let range = temporal::parse("that thing from 2 days ago", fixed_now()).unwrap();
    assert_eq!(range.description, "2 days ago");
    assert_eq!(
        range.start.date_naive(),
        (fixed_now() - Duration::days(2)).date_naive()
    );
}

#[test]
fn week_ranges_are_iso_weeks() {
    let last_week = temporal::parse("last week", fixed_now()).unwrap();
    assert_eq!(last_week.start.date_naive().weekday(), Weekday::Mon);
    assert_eq!(last_week.end.date_naive().weekday(), Weekday::Sun);

    let this_week = temporal::parse("this week", fixed_now()).unwrap();
    assert_eq!(this_week.start.date_naive().weekday(), Weekday::Mon);
    assert_eq!(this_week.end, fixed_now());
}

#[test]
fn fuzzy_phrases_sit_exactly_at_the_threshold() {
    for phrase in ["recently", "lately", "past few days"] {
        let range = temporal::parse(phrase, fixed_now()).unwrap();
        assert_eq!(range.confidence, CONFIDENCE_THRESHOLD, "{phrase}");
    }
}

#[test]
fn every_parsed_range_is_ordered() {
    for phrase in [
        "yesterday",
        "last night",
        "today",
        "this morning",
        "last week",
        "this week",
        "last month",
        "recently",
        "last 30 days",
        "last 2 weeks",
        "7 days ago",
    ] {
        let range = temporal::parse(phrase, fixed_now()).unwrap();
        assert!(range.start <= range.end, "{phrase}");
        assert!(range.confidence >= CONFIDENCE_THRESHOLD, "{phrase}");
    }
}

#[test]
fn non_temporal_text_yields_none() {
    for phrase in [
        "how do I revert a commit",
        "the last dance was great",
        "weekly planning template",
        "",
    ] {
        assert!(temporal::parse(phrase, fixed_now()).is_none(), "{phrase}");
    }
}
