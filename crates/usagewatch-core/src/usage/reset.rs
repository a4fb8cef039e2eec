//! Parse the quota reset instant out of cleaned `/usage` output.
//!
//! Supported phrasings, tried in this order:
//! ```text
//!   Resets 2:59am (America/New_York)
//!   Resets at 00:24 / Resets @ 7:05:30 pm UTC
//!   Resets in 2 hours 45 minutes
//!   Resets in 3h
//!   Resets in 45m
//!   Next reset: 14:30 UTC
//! ```

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use super::timezone::{resolve_timezone, ResolvedTimezone};

static MERIDIEM_TZ_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Resets\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)\s+\(([^)]+)\)")
        .expect("Invalid MERIDIEM_TZ_RE regex")
});
static AT_CLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)Resets?\s+(?:at|@)\s+(\d{1,2}):(\d{2})(?::(\d{2}))?(?:[ \t]*(am|pm))?(?:[ \t]+\(([^)]+)\)|[ \t]+(UTC|GMT|[A-Za-z/_-]+))?",
    )
    .expect("Invalid AT_CLOCK_RE regex")
});
static IN_HOURS_MINUTES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Resets?\s+in\s+(\d+)[ \t]*(?:hours?|h)?[ \t]+(\d+)[ \t]*(?:minutes?|m)?")
        .expect("Invalid IN_HOURS_MINUTES_RE regex")
});
static IN_HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Resets?\s+in\s+(\d+)\s*h").expect("Invalid IN_HOURS_RE regex"));
static IN_MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Resets?\s+in\s+(\d+)\s*m").expect("Invalid IN_MINUTES_RE regex"));
static NEXT_RESET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Next\s+reset[:\s]+(\d{1,2}):(\d{2})(?::(\d{2}))?\s*(UTC|GMT)?")
        .expect("Invalid NEXT_RESET_RE regex")
});

/// A reset instant together with the timezone label it was printed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReset {
    /// When the quota replenishes, in UTC
    pub at: DateTime<Utc>,
    /// Label captured next to the time (e.g. "America/New_York"), if any
    pub timezone_label: Option<String>,
}

type Matcher = fn(&str, DateTime<Utc>) -> Option<ParsedReset>;

const MATCHERS: &[Matcher] = &[
    meridiem_with_timezone,
    at_clock_time,
    in_hours_and_minutes,
    in_hours,
    in_minutes,
    next_reset,
];

/// Find the reset instant in `text`, relative to `now`.
///
/// Returns `None` when no phrasing matches.
pub fn parse_reset_time(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    MATCHERS.iter().find_map(|matcher| matcher(text, now))
}

/// `Resets 2:59am (America/New_York)`, `Resets 7pm (PT)`
fn meridiem_with_timezone(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    let caps = MERIDIEM_TZ_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute = number_or_zero(&caps, 2)?;
    let hour = to_24_hour(hour, Some(&caps[3]));
    let label = caps[4].to_string();

    let at = clock_time_to_utc(hour, minute, 0, Some(&label), now)?;
    debug!(
        hour = hour % 24,
        minute,
        timezone = %label,
        reset_at = %at.format("%Y-%m-%d %H:%M:%S"),
        "usage.reset.parsed"
    );
    Some(ParsedReset {
        at,
        timezone_label: Some(label),
    })
}

/// `Resets at 00:24`, `Resets @ 7:05:30 pm (PT)`, `Resets at 14:30 UTC`
fn at_clock_time(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    let caps = AT_CLOCK_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second = number_or_zero(&caps, 3)?;
    let hour = to_24_hour(hour, caps.get(4).map(|m| m.as_str()));
    let label = caps.get(5).or_else(|| caps.get(6)).map(|m| m.as_str().to_string());

    let at = clock_time_to_utc(hour, minute, second, label.as_deref(), now)?;
    Some(ParsedReset {
        at,
        timezone_label: label,
    })
}

/// `Resets in 2 hours 45 minutes`, `Resets in 3h 15m`
fn in_hours_and_minutes(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    let caps = IN_HOURS_MINUTES_RE.captures(text)?;
    let hours = TimeDelta::try_hours(caps[1].parse().ok()?)?;
    let minutes = TimeDelta::try_minutes(caps[2].parse().ok()?)?;
    relative(now, hours.checked_add(&minutes)?)
}

/// `Resets in 3h`, `Resets in 2 hours`
fn in_hours(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    let caps = IN_HOURS_RE.captures(text)?;
    relative(now, TimeDelta::try_hours(caps[1].parse().ok()?)?)
}

/// `Resets in 45m`, `Resets in 10 minutes`
fn in_minutes(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    let caps = IN_MINUTES_RE.captures(text)?;
    relative(now, TimeDelta::try_minutes(caps[1].parse().ok()?)?)
}

/// `Next reset: 14:30`, `Next reset 14:30:00 GMT`
fn next_reset(text: &str, now: DateTime<Utc>) -> Option<ParsedReset> {
    let caps = NEXT_RESET_RE.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    let second = number_or_zero(&caps, 3)?;
    let label = caps.get(4).map(|m| m.as_str().to_string());

    let at = clock_time_to_utc(hour, minute, second, label.as_deref(), now)?;
    Some(ParsedReset {
        at,
        timezone_label: label,
    })
}

fn relative(now: DateTime<Utc>, delta: TimeDelta) -> Option<ParsedReset> {
    Some(ParsedReset {
        at: now.checked_add_signed(delta)?,
        timezone_label: None,
    })
}

/// Optional numeric group, `0` when absent and `None` when unparseable
fn number_or_zero(caps: &Captures<'_>, group: usize) -> Option<u32> {
    match caps.get(group) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(0),
    }
}

/// Convert a 12-hour clock reading to 24-hour; without a meridiem the hour is kept
fn to_24_hour(hour: u32, meridiem: Option<&str>) -> u32 {
    match meridiem.map(str::to_ascii_lowercase).as_deref() {
        Some("pm") if hour != 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

/// Next occurrence of `hour:minute:second`, read in the labelled zone when
/// it resolves and in UTC otherwise. Out-of-range minutes or seconds yield
/// `None` so the next phrasing gets a chance.
fn clock_time_to_utc(
    hour: u32,
    minute: u32,
    second: u32,
    label: Option<&str>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let Some(time) = NaiveTime::from_hms_opt(hour % 24, minute, second) else {
        debug!(hour, minute, second, "usage.reset.invalid_time");
        return None;
    };

    resolve_timezone(label)
        .unwrap_or(ResolvedTimezone::Utc)
        .next_occurrence(now, time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    /// 2026-01-15 12:00:00 UTC (07:00 in New York)
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn utc(d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, d, h, mi, s).unwrap()
    }

    fn at(text: &str) -> Option<DateTime<Utc>> {
        parse_reset_time(text, now()).map(|r| r.at)
    }

    #[test]
    fn test_meridiem_with_iana_zone() {
        // 02:59 EST has already passed at 07:00 EST, so it is tomorrow's
        let parsed = parse_reset_time("Resets 2:59am (America/New_York)", now()).unwrap();
        assert_eq!(parsed.at, utc(16, 7, 59, 0));
        assert_eq!(parsed.timezone_label.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn test_meridiem_later_today() {
        // 7pm EST = 00:00 UTC on the 16th
        assert_eq!(at("Resets 7pm (America/New_York)"), Some(utc(16, 0, 0, 0)));
        assert_eq!(at("Resets 1pm (UTC)"), Some(utc(15, 13, 0, 0)));
    }

    #[test]
    fn test_meridiem_noon_and_midnight() {
        assert_eq!(at("Resets 12pm (UTC)"), Some(utc(16, 12, 0, 0)));
        assert_eq!(at("Resets 12am (UTC)"), Some(utc(16, 0, 0, 0)));
    }

    #[test]
    fn test_meridiem_with_alias() {
        // 9am JST = 00:00 UTC; already past at 12:00 UTC
        assert_eq!(at("Resets 9am (JST)"), Some(utc(16, 0, 0, 0)));
    }

    #[test]
    fn test_meridiem_unknown_zone_falls_back_to_utc() {
        let parsed = parse_reset_time("Resets 3pm (Somewhere/Else)", now()).unwrap();
        assert_eq!(parsed.at, utc(15, 15, 0, 0));
        assert_eq!(parsed.timezone_label.as_deref(), Some("Somewhere/Else"));
    }

    #[test]
    fn test_at_clock_time() {
        assert_eq!(at("Resets at 00:24"), Some(utc(16, 0, 24, 0)));
        assert_eq!(at("Resets @ 18:05:30"), Some(utc(15, 18, 5, 30)));
    }

    #[test]
    fn test_at_clock_time_with_meridiem_and_zone() {
        let parsed = parse_reset_time("Resets at 7:05 pm (UTC+2)", now()).unwrap();
        assert_eq!(parsed.at, utc(15, 17, 5, 0));
        assert_eq!(parsed.timezone_label.as_deref(), Some("UTC+2"));
    }

    #[test]
    fn test_at_clock_time_with_bare_zone() {
        let parsed = parse_reset_time("Reset at 14:30 UTC", now()).unwrap();
        assert_eq!(parsed.at, utc(15, 14, 30, 0));
        assert_eq!(parsed.timezone_label.as_deref(), Some("UTC"));

        let parsed = parse_reset_time("Resets at 08:00 PST", now()).unwrap();
        assert_eq!(parsed.at, utc(15, 16, 0, 0));
    }

    #[test]
    fn test_at_clock_time_with_parenthesised_zone() {
        // 14:30 at +02:00 is 12:30 UTC, still ahead of 12:00 UTC
        let parsed = parse_reset_time("Resets at 14:30 (UTC+2)", now()).unwrap();
        assert_eq!(parsed.at, utc(15, 12, 30, 0));
        assert_eq!(parsed.timezone_label.as_deref(), Some("UTC+2"));

        let parsed = parse_reset_time("Resets at 9:00 (Asia/Tokyo)", now()).unwrap();
        assert_eq!(parsed.at, utc(16, 0, 0, 0));
        assert_eq!(parsed.timezone_label.as_deref(), Some("Asia/Tokyo"));
    }

    #[test]
    fn test_at_clock_time_bare_zone_label_kept() {
        let parsed = parse_reset_time("Resets at 08:00 PST", now()).unwrap();
        assert_eq!(parsed.timezone_label.as_deref(), Some("PST"));
    }

    #[test]
    fn test_at_clock_time_without_zone_has_no_label() {
        let parsed = parse_reset_time("Resets at 13:00", now()).unwrap();
        assert_eq!(parsed.timezone_label, None);

        // The zone must sit on the same line as the time
        let parsed = parse_reset_time("Resets at 13:00\nEsc to cancel", now()).unwrap();
        assert_eq!(parsed.at, utc(15, 13, 0, 0));
        assert_eq!(parsed.timezone_label, None);
    }

    #[test]
    fn test_hour_wraps_modulo_24() {
        assert_eq!(at("Resets at 24:10"), Some(utc(16, 0, 10, 0)));
    }

    #[test]
    fn test_in_hours_and_minutes() {
        assert_eq!(at("Resets in 2 hours 45 minutes"), Some(utc(15, 14, 45, 0)));
        assert_eq!(at("Resets in 3h 15m"), Some(utc(15, 15, 15, 0)));
    }

    #[test]
    fn test_in_hours_stays_on_its_line() {
        assert_eq!(at("Resets in 3h\n64% used"), Some(utc(15, 15, 0, 0)));
    }

    #[test]
    fn test_in_hours() {
        assert_eq!(at("Resets in 3h"), Some(utc(15, 15, 0, 0)));
        assert_eq!(at("Resets in 1 hour"), Some(utc(15, 13, 0, 0)));
    }

    #[test]
    fn test_in_minutes() {
        assert_eq!(at("Resets in 45m"), Some(utc(15, 12, 45, 0)));
        assert_eq!(at("resets in 5 minutes"), Some(utc(15, 12, 5, 0)));
    }

    #[test]
    fn test_relative_has_no_label() {
        let parsed = parse_reset_time("Resets in 45m", now()).unwrap();
        assert_eq!(parsed.timezone_label, None);
    }

    #[test]
    fn test_next_reset() {
        assert_eq!(at("Next reset: 14:30"), Some(utc(15, 14, 30, 0)));
        assert_eq!(at("Next reset 09:15:10 GMT"), Some(utc(16, 9, 15, 10)));
    }

    #[test]
    fn test_invalid_minutes_fall_through() {
        assert_eq!(at("Resets 2:75am (UTC)"), None);
    }

    #[test]
    fn test_no_reset_text() {
        assert_eq!(at("42% used"), None);
        assert_eq!(at(""), None);
    }

    #[test]
    fn test_first_phrasing_wins() {
        let text = "Resets in 45m\nResets 7pm (UTC)";
        assert_eq!(at(text), Some(utc(15, 19, 0, 0)));
    }
}
