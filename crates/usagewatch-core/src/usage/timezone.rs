//! Resolve timezone labels printed next to reset times.

use chrono::{DateTime, Days, FixedOffset, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Common abbreviations mapped to a canonical zone identifier
const TIMEZONE_ALIASES: &[(&str, &str)] = &[
    ("PT", "America/Los_Angeles"),
    ("PST", "America/Los_Angeles"),
    ("PDT", "America/Los_Angeles"),
    ("MT", "America/Denver"),
    ("MST", "America/Denver"),
    ("MDT", "America/Denver"),
    ("CT", "America/Chicago"),
    ("CST", "America/Chicago"),
    ("CDT", "America/Chicago"),
    ("ET", "America/New_York"),
    ("EST", "America/New_York"),
    ("EDT", "America/New_York"),
    ("AKST", "America/Anchorage"),
    ("AKDT", "America/Anchorage"),
    ("HST", "Pacific/Honolulu"),
    ("BST", "Europe/London"),
    ("CEST", "Europe/Berlin"),
    ("CET", "Europe/Berlin"),
    ("IST", "Asia/Kolkata"),
    ("AEST", "Australia/Sydney"),
    ("AEDT", "Australia/Sydney"),
    ("JST", "Asia/Tokyo"),
    ("KST", "Asia/Seoul"),
];

/// `[UTC|GMT]±H[H][[:]MM]`, matched against the upper-cased label with spaces removed
static UTC_OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:UTC|GMT)?([+-])(\d{1,2})(?::?(\d{2}))?$").expect("Invalid UTC_OFFSET_RE regex")
});

/// A timezone a reset time can be interpreted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTimezone {
    Utc,
    Fixed(FixedOffset),
    Named(Tz),
}

impl ResolvedTimezone {
    /// The first instant strictly after `now` whose wall-clock time in this
    /// zone is `time`: today if still ahead, otherwise tomorrow.
    pub fn next_occurrence(&self, now: DateTime<Utc>, time: NaiveTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Utc => next_occurrence_in(&Utc, now, time),
            Self::Fixed(offset) => next_occurrence_in(offset, now, time),
            Self::Named(tz) => next_occurrence_in(tz, now, time),
        }
    }

    /// Wall-clock time of `instant` in this zone
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Utc => instant.naive_utc(),
            Self::Fixed(offset) => instant.with_timezone(offset).naive_local(),
            Self::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }
}

/// Resolve a label such as `PST`, `UTC+5:30` or `America/New_York`.
///
/// Unknown labels yield `None`; resolution never fails the caller.
pub fn resolve_timezone(label: Option<&str>) -> Option<ResolvedTimezone> {
    let label = label?.trim();
    if label.is_empty() {
        return None;
    }

    let upper = label.to_ascii_uppercase();
    let label = TIMEZONE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, target)| *target)
        .unwrap_or(label);

    if label.eq_ignore_ascii_case("UTC") || label.eq_ignore_ascii_case("GMT") {
        return Some(ResolvedTimezone::Utc);
    }

    if let Some(offset) = parse_utc_offset(label) {
        return Some(ResolvedTimezone::Fixed(offset));
    }

    match label.parse::<Tz>() {
        Ok(tz) => Some(ResolvedTimezone::Named(tz)),
        Err(_) => {
            debug!(label = %label, "usage.timezone.unknown");
            None
        }
    }
}

/// Parse a fixed offset like `+9`, `-05:00`, `UTC+5:30` or `GMT-0800`
fn parse_utc_offset(label: &str) -> Option<FixedOffset> {
    let sanitized: String = label
        .trim()
        .to_ascii_uppercase()
        .chars()
        .filter(|c| *c != ' ')
        .collect();
    let caps = UTC_OFFSET_RE.captures(&sanitized)?;

    let sign = if &caps[1] == "+" { 1 } else { -1 };
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn next_occurrence_in<Z: TimeZone>(
    zone: &Z,
    now: DateTime<Utc>,
    time: NaiveTime,
) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(zone).date_naive();
    let candidate = to_utc(zone, today.and_time(time))?;
    if candidate > now {
        return Some(candidate);
    }
    let tomorrow = today.checked_add_days(Days::new(1))?;
    to_utc(zone, tomorrow.and_time(time))
}

/// Map a local wall-clock time to UTC. Ambiguous times take the earlier
/// instant; times inside a DST gap are read with the pre-transition offset.
fn to_utc<Z: TimeZone>(zone: &Z, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(local + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}
