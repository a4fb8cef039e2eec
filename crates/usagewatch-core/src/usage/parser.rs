//! Parse the usage percentage out of cleaned `/usage` output.
//!
//! Strategies run in a fixed order and the first hit wins. Later strategies
//! are looser, so they only see the text once the stricter ones gave up.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Maximum length of the input excerpt carried by [`ParseError`]
const SNIPPET_MAX_CHARS: usize = 120;

static USAGE_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(used|usage|messages|remaining|limit)").expect("Invalid USAGE_KEYWORD_RE regex")
});
static DIRECT_PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*(?:used|usage|of|remaining)?")
        .expect("Invalid DIRECT_PERCENT_RE regex")
});
static USED_OF_TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)used\s+(\d+)\s+of\s+(\d+)\s+messages").expect("Invalid USED_OF_TOTAL_RE regex")
});
static MESSAGES_SLASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Messages?:\s*(\d+)\s*/\s*(\d+)").expect("Invalid MESSAGES_SLASH_RE regex")
});
static MESSAGES_USED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s+messages?\s+used").expect("Invalid MESSAGES_USED_RE regex")
});
static REMAINING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s+remaining").expect("Invalid REMAINING_RE regex"));

/// Usage output that none of the strategies understood
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("could not parse usage percentage from '{snippet}'")]
    NoUsageFound { snippet: String },
}

/// A single way of reading the usage percentage
struct Strategy {
    name: &'static str,
    matcher: fn(&[&str]) -> Option<f64>,
}

const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "direct_percent",
        matcher: direct_percent,
    },
    Strategy {
        name: "used_of_total",
        matcher: used_of_total,
    },
    Strategy {
        name: "messages_slash",
        matcher: messages_slash,
    },
    Strategy {
        name: "used_remaining",
        matcher: used_remaining,
    },
];

/// Extract the usage percentage, clamped to `[0, 100]`.
pub fn parse_usage(text: &str) -> Result<f64, ParseError> {
    let lines: Vec<&str> = text.trim().lines().collect();

    for strategy in STRATEGIES {
        if let Some(percent) = (strategy.matcher)(&lines) {
            debug!(
                format = strategy.name,
                usage_percent = percent,
                "usage.parse.format"
            );
            return Ok(percent.clamp(0.0, 100.0));
        }
    }

    Err(ParseError::NoUsageFound {
        snippet: snippet(text),
    })
}

/// `72% used`, `12.5 % of`, `40% remaining` on a line that talks about usage
fn direct_percent(lines: &[&str]) -> Option<f64> {
    lines
        .iter()
        .filter(|line| USAGE_KEYWORD_RE.is_match(line))
        .find_map(|line| DIRECT_PERCENT_RE.captures(line)?[1].parse().ok())
}

/// `You have used 28 of 40 messages`
fn used_of_total(lines: &[&str]) -> Option<f64> {
    lines.iter().find_map(|line| ratio(&USED_OF_TOTAL_RE, line))
}

/// `Messages: 28/40`
fn messages_slash(lines: &[&str]) -> Option<f64> {
    lines.iter().find_map(|line| ratio(&MESSAGES_SLASH_RE, line))
}

/// `28 messages used` together with `12 remaining`, possibly on another line
fn used_remaining(lines: &[&str]) -> Option<f64> {
    let (used_line, used) = lines.iter().find_map(|line| {
        let used: u64 = MESSAGES_USED_RE.captures(line)?[1].parse().ok()?;
        Some((*line, used))
    })?;

    let remaining: u64 = std::iter::once(used_line)
        .chain(lines.iter().copied())
        .find_map(|line| REMAINING_RE.captures(line)?[1].parse().ok())?;

    let total = used.checked_add(remaining)?;
    if total == 0 {
        return None;
    }
    Some(used as f64 / total as f64 * 100.0)
}

/// `used / total * 100` from a two-group pattern; lines with a zero total are skipped
fn ratio(re: &Regex, line: &str) -> Option<f64> {
    let caps = re.captures(line)?;
    let used: u64 = caps[1].parse().ok()?;
    let total: u64 = caps[2].parse().ok()?;
    if total == 0 {
        return None;
    }
    Some(used as f64 / total as f64 * 100.0)
}

/// Single-line excerpt of the input for diagnostics
fn snippet(text: &str) -> String {
    let flattened = text.replace('\n', " ");
    let flattened = flattened.trim();
    if flattened.chars().count() > SNIPPET_MAX_CHARS {
        let head: String = flattened.chars().take(SNIPPET_MAX_CHARS - 3).collect();
        format!("{head}...")
    } else {
        flattened.to_string()
    }
}
