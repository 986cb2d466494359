//! Timestamp extraction for jump points.
//!
//! Accepted notations: `H:MM:SS`, `M:SS`, and the compact `NmSs`, `Nm`, `Ns`
//! forms (unit letters in any case). Anything that looks like a timestamp but
//! does not validate, or overflows `u32` seconds, is skipped without error.
//!
//! The bare seconds form is capped at three digits so decades ("the 1990s")
//! are not read as times.

use regex::Regex;
use std::sync::OnceLock;

/// One time reference found in a string. Offsets are byte positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampMatch {
    pub start: usize,
    pub end: usize,
    pub seconds: u32,
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(\d{1,3}):(\d{2})(?::(\d{2}))?|(\d{1,4})m\s?(\d{1,4})s|(\d{1,4})m|(\d{1,3})s)\b",
        )
        .expect("timestamp regex is valid")
    })
}

/// Find every time reference in `text`, left to right, non-overlapping.
pub fn find_timestamps(text: &str) -> Vec<TimestampMatch> {
    timestamp_re()
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let num = |i: usize| cap.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

            let seconds = if let (Some(a), Some(b)) = (num(1), num(2)) {
                match num(3) {
                    Some(c) => hms(a, b, c)?,
                    None => ms(a, b)?,
                }
            } else if let (Some(m), Some(s)) = (num(4), num(5)) {
                m.checked_mul(60)?.checked_add(s)?
            } else if let Some(m) = num(6) {
                m.checked_mul(60)?
            } else {
                num(7)?
            };

            Some(TimestampMatch {
                start: whole.start(),
                end: whole.end(),
                seconds,
            })
        })
        .collect()
}

/// Parse a single timestamp fragment such as `"1:02:03"` or `"4m"`.
///
/// Returns `None` for anything that is not exactly one valid timestamp.
pub fn parse_timestamp(fragment: &str) -> Option<u32> {
    let fragment = fragment.trim();
    if fragment.contains(':') {
        let parts: Vec<&str> = fragment.split(':').collect();
        let nums: Option<Vec<u32>> = parts
            .iter()
            .map(|p| {
                if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) {
                    p.parse::<u32>().ok()
                } else {
                    None
                }
            })
            .collect();
        return match nums?.as_slice() {
            [m, s] => ms(*m, *s),
            [h, m, s] => hms(*h, *m, *s),
            _ => None,
        };
    }

    let matches = find_timestamps(fragment);
    match matches.as_slice() {
        [only] if only.start == 0 && only.end == fragment.len() => Some(only.seconds),
        _ => None,
    }
}

/// Format seconds as `M:SS`, or `H:MM:SS` from one hour up.
pub fn format_timestamp(seconds: u32) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

fn ms(m: u32, s: u32) -> Option<u32> {
    if s >= 60 {
        return None;
    }
    m.checked_mul(60)?.checked_add(s)
}

fn hms(h: u32, m: u32, s: u32) -> Option<u32> {
    if m >= 60 || s >= 60 {
        return None;
    }
    h.checked_mul(3600)?.checked_add(m * 60 + s)
}
