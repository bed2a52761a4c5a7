//! Scheduled-time parsing and the "is it overdue" comparison.
//!
//! Medications recur daily, so only the time of day matters.  Times are
//! accepted as 12-hour (`08:00 AM`) or 24-hour (`20:00`) text and compared
//! at minute granularity, the same ordering as comparing `HH:MM` strings.

use chrono::{NaiveTime, Timelike};

use crate::errors::{MedGuardError, Result};

const FORMATS: &[&str] = &["%I:%M %p", "%I:%M%p", "%H:%M"];

/// Parse a scheduled time in any accepted format.
pub fn parse_time(input: &str) -> Result<NaiveTime> {
    let input = input.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(input, fmt).ok())
        .ok_or_else(|| {
            MedGuardError::InvalidRecord(format!(
                "scheduled time '{input}' is not in '08:00 AM' or '20:00' form"
            ))
        })
}

/// Normalize a scheduled time to 24-hour `HH:MM`.
pub fn normalize(input: &str) -> Result<String> {
    parse_time(input).map(|t| t.format("%H:%M").to_string())
}

/// Minutes since midnight, dropping seconds.
pub fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// `true` when `scheduled` is strictly earlier than `now` at minute granularity.
pub fn is_overdue(scheduled: NaiveTime, now: NaiveTime) -> bool {
    minute_of_day(scheduled) < minute_of_day(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_twelve_hour_times() {
        assert_eq!(parse_time("08:00 AM").unwrap(), t(8, 0));
        assert_eq!(parse_time("12:15 AM").unwrap(), t(0, 15));
        assert_eq!(parse_time("12:00 PM").unwrap(), t(12, 0));
        assert_eq!(parse_time("07:45 pm").unwrap(), t(19, 45));
        assert_eq!(parse_time("9:05PM").unwrap(), t(21, 5));
    }

    #[test]
    fn parses_twenty_four_hour_times() {
        assert_eq!(parse_time("23:00").unwrap(), t(23, 0));
        assert_eq!(parse_time(" 00:30 ").unwrap(), t(0, 30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_time("noon").is_err());
        assert!(parse_time("25:00").is_err());
        assert!(parse_time("").is_err());
    }

    #[test]
    fn normalize_outputs_hh_mm() {
        assert_eq!(normalize("08:00 AM").unwrap(), "08:00");
        assert_eq!(normalize("01:30 PM").unwrap(), "13:30");
    }

    #[test]
    fn overdue_is_strict_and_ignores_seconds() {
        assert!(is_overdue(t(8, 0), t(9, 0)));
        assert!(!is_overdue(t(23, 0), t(9, 0)));
        assert!(!is_overdue(t(9, 0), NaiveTime::from_hms_opt(9, 0, 59).unwrap()));
        assert!(is_overdue(t(8, 59), t(9, 0)));
    }
}
