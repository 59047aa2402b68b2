//! Permissive clinical timestamp parsing.
//!
//! CCDA documents carry HL7 "compact" timestamps (`YYYYMMDDHHMMSS±zzzz`,
//! truncatable from the right) while derived fields and test fixtures use
//! ISO 8601. Both are accepted. Timezone offsets are stripped, keeping the
//! local wall-clock time; all comparisons downstream are offset-naive.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// The sentinel date written when coercion of a date field fails.
pub fn epoch_date() -> NaiveDate {
    epoch_datetime().date()
}

/// The sentinel datetime written when coercion of a datetime field fails.
pub fn epoch_datetime() -> NaiveDateTime {
    DateTime::UNIX_EPOCH.naive_utc()
}

/// Last representable second of the given day. Used to widen zero-width
/// visit windows when matching datetime-precision events.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

/// Parses a date from any accepted timestamp shape, discarding any time
/// component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_datetime(raw).map(|dt| dt.date())
}

/// Parses a datetime from HL7 compact or ISO 8601 text. Date-only inputs
/// resolve to midnight. Returns `None` when the text fits no known shape.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let bare = strip_offset(trimmed);
    if bare.contains('-') || bare.contains('T') || bare.contains(':') {
        parse_iso(bare)
    } else {
        parse_compact(bare)
    }
}

/// Drops a trailing `Z`, `±HHMM`, or `±HH:MM` offset designator.
fn strip_offset(s: &str) -> &str {
    let s = s.strip_suffix('Z').unwrap_or(s);
    // A sign only marks an offset after the time separator in ISO text, or
    // after the eight date digits in compact text. An ISO date's own hyphens
    // must not match.
    let search_from = if let Some(t) = s.find(['T', ' ']) {
        t + 1
    } else if s.len() >= 8 && s.as_bytes()[..8].iter().all(u8::is_ascii_digit) {
        8
    } else {
        return s;
    };
    match s[search_from..].find(['+', '-']) {
        Some(pos) => &s[..search_from + pos],
        None => s,
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            // Sub-second precision is dropped; every comparison downstream
            // is second-granularity.
            return dt.with_nanosecond(0);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn parse_compact(s: &str) -> Option<NaiveDateTime> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Truncated HL7 precision: seconds, minutes, hours, or date only.
    let date = NaiveDate::parse_from_str(s.get(..8)?, "%Y%m%d").ok()?;
    let time = match s.len() {
        14.. => NaiveTime::parse_from_str(&s[8..14], "%H%M%S").ok()?,
        12..=13 => NaiveTime::parse_from_str(&s[8..12], "%H%M").ok()?,
        // chrono cannot parse an hour without minutes, so build it by hand
        10..=11 => NaiveTime::from_hms_opt(s[8..10].parse().ok()?, 0, 0)?,
        _ => NaiveTime::MIN,
    };
    Some(date.and_time(time))
}
