//! Timestamp extraction for kernel log lines.
//!
//! Three dialects are recognised, tried in this order (first match wins):
//!
//! ```text
//! [668192.306121] ...                         dmesg, seconds since boot
//! [Mon Feb  1 09:08:13 2021] ...              dmesg -T, ctime
//! Jun 29 15:39:16 host kernel: ...            syslog, year-less
//! 2021-02-01T09:08:13.123456+0000 host ...    journalctl short-iso-precise
//! ```
//!
//! A line matching none of them yields `None`; callers render that as
//! [`UNRESOLVED`].

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder shown wherever a timestamp could not be recovered
pub const UNRESOLVED: &str = "unable to extract";

/// A timestamp recovered from a log line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LogTime {
    /// Seconds since boot, as printed by plain `dmesg`
    Uptime(f64),
    /// Wall-clock time without offset (syslog, `dmesg -T`)
    Local(NaiveDateTime),
    /// Wall-clock time with numeric offset (journalctl)
    Zoned(DateTime<FixedOffset>),
}

impl LogTime {
    /// Wall-clock time truncated to the hour, used for the occurrence histogram.
    /// Uptime stamps have no calendar position and return `None`.
    pub fn date_hour(&self) -> Option<NaiveDateTime> {
        let naive = match self {
            LogTime::Uptime(_) => return None,
            LogTime::Local(dt) => *dt,
            LogTime::Zoned(dt) => dt.naive_local(),
        };
        naive
            .with_minute(0)
            .and_then(|dt| dt.with_second(0))
            .and_then(|dt| dt.with_nanosecond(0))
    }
}

impl fmt::Display for LogTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTime::Uptime(secs) => write!(f, "{:.6}s after boot", secs),
            LogTime::Local(dt) => write!(f, "{}", dt.format("%a %b %d %H:%M:%S")),
            LogTime::Zoned(dt) => write!(f, "{}", dt.format("%a %b %d %H:%M:%S %z")),
        }
    }
}

/// Render an optional timestamp, substituting the placeholder
pub fn display_or_unresolved(time: Option<&LogTime>) -> String {
    match time {
        Some(t) => t.to_string(),
        None => UNRESOLVED.to_string(),
    }
}

type Extractor = fn(&str, i32) -> Option<LogTime>;

/// Extractors in priority order
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("dmesg", from_dmesg),
    ("syslog", from_syslog),
    ("journal", from_journal),
];

/// Extract a timestamp from a raw log line.
///
/// `year` fills in the missing year of syslog stamps.
pub fn extract_timestamp(line: &str, year: i32) -> Option<LogTime> {
    EXTRACTORS
        .iter()
        .find_map(|(_, extract)| extract(line, year))
}

/// Name of the dialect that produced the timestamp, if any
pub fn detect_format(line: &str, year: i32) -> Option<&'static str> {
    EXTRACTORS
        .iter()
        .find(|(_, extract)| extract(line, year).is_some())
        .map(|(name, _)| *name)
}

/// Year used for syslog stamps when the caller has no better idea
pub fn current_year() -> i32 {
    Local::now().year()
}

fn from_dmesg(line: &str, _year: i32) -> Option<LogTime> {
    let rest = line.strip_prefix('[')?;
    let end = rest.find(']')?;
    let raw = rest[..end].trim();

    if let Ok(secs) = raw.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Some(LogTime::Uptime(secs));
        }
        return None;
    }

    // ctime pads single-digit days with an extra space
    let collapsed = collapse_whitespace(raw);
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(LogTime::Local)
}

fn from_syslog(line: &str, year: i32) -> Option<LogTime> {
    let mut tokens = line.split_whitespace();
    let month = tokens.next()?;
    let day = tokens.next()?;
    let time = tokens.next()?;

    if month.len() != 3 || !month.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let parse = |y: i32| {
        let raw = format!("{} {} {} {}", y, month, day, time);
        NaiveDateTime::parse_from_str(&raw, "%Y %b %d %H:%M:%S").ok()
    };
    if let Some(dt) = parse(year) {
        return Some(LogTime::Local(dt));
    }

    // Feb 29 in a non-leap reference year belongs to the latest leap year before it
    if month.eq_ignore_ascii_case("feb") && day.trim_start_matches('0') == "29" {
        return (1..=8).find_map(|back| parse(year - back)).map(LogTime::Local);
    }
    None
}

fn from_journal(line: &str, _year: i32) -> Option<LogTime> {
    let token = line.split_whitespace().next()?;
    DateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(token))
        .ok()
        .map(LogTime::Zoned)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
