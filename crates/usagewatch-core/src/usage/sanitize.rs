//! Strip terminal decoration from captured command output.

use once_cell::sync::Lazy;
use regex::Regex;

/// OSC sequences (window titles, hyperlinks), terminated by BEL or ST
static OSC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").expect("Invalid OSC_RE regex"));

/// CSI sequences (colors, cursor movement, erase)
static CSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("Invalid CSI_RE regex"));

/// Characters kept as-is: printable ASCII plus the ASCII whitespace set.
fn is_printable(c: char) -> bool {
    matches!(c, ' '..='~' | '\t' | '\n' | '\x0b' | '\x0c')
}

/// Clean raw captured output into plain, line-oriented text.
///
/// Carriage returns become newlines, escape sequences are removed, any other
/// non-printable character is replaced by a space, trailing whitespace is
/// trimmed and blank lines are dropped. Running it on already clean text
/// returns the text unchanged.
pub fn clean_output(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = raw.replace('\r', "\n");
    let text = OSC_RE.replace_all(&text, "");
    let text = CSI_RE.replace_all(&text, "");

    let text: String = text
        .chars()
        .map(|c| if is_printable(c) { c } else { ' ' })
        .collect();

    text.split(['\n', '\x0b', '\x0c'])
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
