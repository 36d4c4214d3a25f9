//! # Reminder Time Parser
//!
//! Turns free text into a validated instant in the configured zone. Two
//! grammars are accepted: `YYYY-MM-DD HH:MM` and a bare `HH:MM`.
//!
//! A bare time means its next occurrence: today if that wall time is still
//! strictly in the future, otherwise tomorrow. A time equal to "now" is not in
//! the future, so `23:59` entered at `23:59:30` lands on tomorrow.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Bare times roll over to tomorrow instead of being rejected
//! - 1.0.0: Initial release

use chrono::offset::LocalResult;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

use crate::core::ReminderError;

/// Display/parse format for absolute instants
pub const INSTANT_FORMAT: &str = "%Y-%m-%d %H:%M";

const DATETIME_PATTERN: &str = r"(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2})";
const TIME_PATTERN: &str = r"(\d{2}):(\d{2})";

fn datetime_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{DATETIME_PATTERN}$")).expect("valid regex"))
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^{TIME_PATTERN}$")).expect("valid regex"))
}

/// `<text> <when>` where `<when>` sits at the very end of the input
fn trailing_when_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // (?s): reminder text may span lines
        Regex::new(r"(?s)^(?:(?P<text>.*?)\s+)?(?P<when>\d{4}-\d{2}-\d{2} \d{2}:\d{2}|\d{2}:\d{2})$")
            .expect("valid regex")
    })
}

/// Parse `input` into an instant strictly after `now`.
pub fn parse_instant(input: &str, now: DateTime<Utc>, tz: Tz) -> Result<DateTime<Tz>, ReminderError> {
    let input = input.trim();
    let now = now.with_timezone(&tz);

    let instant = if let Some(caps) = datetime_regex().captures(input) {
        let field = |i: usize| caps[i].parse::<u32>().ok();
        let year = caps[1]
            .parse::<i32>()
            .map_err(|_| ReminderError::Format(input.to_string()))?;
        let (month, day, hour, minute) = match (field(2), field(3), field(4), field(5)) {
            (Some(mo), Some(d), Some(h), Some(mi)) => (mo, d, h, mi),
            _ => return Err(ReminderError::Format(input.to_string())),
        };

        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| ReminderError::Format(input.to_string()))?;
        let time = clock_time(hour, minute).ok_or_else(|| ReminderError::Format(input.to_string()))?;
        localize(tz, date.and_time(time)).ok_or_else(|| ReminderError::Format(input.to_string()))?
    } else if let Some(caps) = time_regex().captures(input) {
        let hour = caps[1].parse::<u32>().ok();
        let minute = caps[2].parse::<u32>().ok();
        let time = hour
            .zip(minute)
            .and_then(|(h, m)| clock_time(h, m))
            .ok_or_else(|| ReminderError::Format(input.to_string()))?;
        next_occurrence(time, now, tz).ok_or_else(|| ReminderError::Format(input.to_string()))?
    } else {
        return Err(ReminderError::Format(input.to_string()));
    };

    if instant <= now {
        return Err(ReminderError::PastInstant);
    }
    Ok(instant)
}

/// Split `"<text> <when>"` into trimmed text and a parsed instant.
///
/// Used by the one-message `/remind` form.
pub fn parse_text_and_instant(
    input: &str,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<(String, DateTime<Tz>), ReminderError> {
    let input = input.trim();
    let caps = trailing_when_regex()
        .captures(input)
        .ok_or_else(|| ReminderError::Format(input.to_string()))?;

    let text = caps.name("text").map(|m| m.as_str().trim()).unwrap_or("");
    if text.is_empty() {
        return Err(ReminderError::EmptyText);
    }
    let instant = parse_instant(&caps["when"], now, tz)?;
    Ok((text.to_string(), instant))
}

/// Parse a 1-based position into a list of `len` items
pub fn parse_index(input: &str, len: usize) -> Result<usize, ReminderError> {
    let input = input.trim();
    if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReminderError::Type(input.to_string()));
    }

    let index = match input.parse::<u64>() {
        Ok(n) => n,
        Err(_) => return Err(ReminderError::Range { index: u64::MAX, len }),
    };
    if index == 0 || index > len as u64 {
        return Err(ReminderError::Range { index, len });
    }
    Ok(index as usize)
}

/// Render an instant the way lists and confirmations show it
pub fn format_instant(instant: &DateTime<Tz>) -> String {
    instant.format(INSTANT_FORMAT).to_string()
}

fn clock_time(hour: u32, minute: u32) -> Option<NaiveTime> {
    if hour > 23 || minute > 59 {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Nonexistent local times (DST gaps) yield `None`; ambiguous ones take the earlier instant.
fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(a, b) => Some(a.min(b)),
        LocalResult::None => None,
    }
}

/// Today's occurrence if still ahead, else tomorrow's. A time skipped by a DST
/// gap has no occurrence and yields `None`; a repeated time may still be ahead
/// in its later occurrence.
fn next_occurrence(time: NaiveTime, now: DateTime<Tz>, tz: Tz) -> Option<DateTime<Tz>> {
    let today = now.date_naive();
    match tz.from_local_datetime(&today.and_time(time)) {
        LocalResult::None => return None,
        LocalResult::Single(candidate) if candidate > now => return Some(candidate),
        LocalResult::Ambiguous(a, b) => {
            let (earliest, latest) = if a <= b { (a, b) } else { (b, a) };
            if earliest > now {
                return Some(earliest);
            }
            if latest > now {
                return Some(latest);
            }
        }
        LocalResult::Single(_) => {}
    }
    let tomorrow = today.succ_opt()?;
    localize(tz, tomorrow.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TZ: Tz = chrono_tz::Europe::Samara;

    fn now_at(local: &str) -> DateTime<Utc> {
        let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S").unwrap();
        TZ.from_local_datetime(&naive).unwrap().with_timezone(&Utc)
    }

    fn local(s: &str) -> DateTime<Tz> {
        let naive = NaiveDateTime::parse_from_str(s, INSTANT_FORMAT).unwrap();
        TZ.from_local_datetime(&naive).unwrap()
    }

    #[test]
    fn test_absolute_datetime() {
        let now = now_at("2024-05-01 12:00:00");
        assert_eq!(
            parse_instant("2024-05-02 08:30", now, TZ).unwrap(),
            local("2024-05-02 08:30")
        );
    }

    #[test]
    fn test_bare_time_later_today() {
        let now = now_at("2024-05-01 23:58:00");
        assert_eq!(parse_instant("23:59", now, TZ).unwrap(), local("2024-05-01 23:59"));
    }

    #[test]
    fn test_bare_time_already_passed_rolls_to_tomorrow() {
        let now = now_at("2024-05-01 23:59:30");
        assert_eq!(parse_instant("23:59", now, TZ).unwrap(), local("2024-05-02 23:59"));
    }

    #[test]
    fn test_bare_time_equal_to_now_rolls_to_tomorrow() {
        let now = now_at("2024-05-01 09:00:00");
        assert_eq!(parse_instant("09:00", now, TZ).unwrap(), local("2024-05-02 09:00"));
    }

    #[test]
    fn test_grammar_is_strict_about_digits_and_spacing() {
        let now = now_at("2024-05-01 08:00:00");
        for bad in ["9:05", "2024-05-02 9:05", "2024-05-02\t09:05", "2024-05-02  09:05"] {
            assert!(
                matches!(parse_instant(bad, now, TZ), Err(ReminderError::Format(_))),
                "{bad:?} should be a format error"
            );
        }
        assert_eq!(parse_instant("09:05", now, TZ).unwrap(), local("2024-05-01 09:05"));
    }

    #[test]
    fn test_month_end_rollover() {
        let now = now_at("2024-12-31 22:00:00");
        assert_eq!(parse_instant("07:00", now, TZ).unwrap(), local("2025-01-01 07:00"));
    }

    #[test]
    fn test_past_absolute_is_rejected() {
        let now = now_at("2024-05-01 12:00:00");
        assert_eq!(
            parse_instant("2024-05-01 12:00", now, TZ),
            Err(ReminderError::PastInstant)
        );
        assert_eq!(
            parse_instant("2023-01-01 10:00", now, TZ),
            Err(ReminderError::PastInstant)
        );
    }

    #[test]
    fn test_grammar_mismatch_is_format_error() {
        let now = now_at("2024-05-01 12:00:00");
        for bad in ["tomorrow", "12-30", "2024/05/02 10:00", "", "10:5", "10:00 pm"] {
            assert!(
                matches!(parse_instant(bad, now, TZ), Err(ReminderError::Format(_))),
                "{bad:?} should be a format error"
            );
        }
    }

    #[test]
    fn test_out_of_range_fields_are_format_errors() {
        let now = now_at("2024-05-01 12:00:00");
        for bad in ["24:00", "12:60", "2024-02-30 10:00", "2024-13-01 10:00", "2099-01-01 25:00"] {
            assert!(
                matches!(parse_instant(bad, now, TZ), Err(ReminderError::Format(_))),
                "{bad:?} should be a format error"
            );
        }
    }

    #[test]
    fn test_leap_day() {
        let now = now_at("2024-01-01 00:00:00");
        assert!(parse_instant("2024-02-29 10:00", now, TZ).is_ok());
        assert!(parse_instant("2025-02-29 10:00", now, TZ).is_err());
    }

    #[test]
    fn test_dst_gap_is_format_error() {
        let berlin = chrono_tz::Europe::Berlin;
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            parse_instant("2024-03-31 02:30", now, berlin),
            Err(ReminderError::Format(_))
        ));
    }

    #[test]
    fn test_bare_time_in_dst_gap_is_format_error() {
        let berlin = chrono_tz::Europe::Berlin;
        // 2024-03-31 00:30 CET; 02:00-03:00 does not exist that night
        let now = Utc.with_ymd_and_hms(2024, 3, 30, 23, 30, 0).unwrap();
        assert!(matches!(
            parse_instant("02:30", now, berlin),
            Err(ReminderError::Format(_))
        ));
        assert!(parse_instant("03:30", now, berlin).is_ok());
    }

    #[test]
    fn test_bare_time_repeated_by_fall_back() {
        let berlin = chrono_tz::Europe::Berlin;
        // 02:30 on 2024-10-27 happens at 00:30 UTC (CEST) and again at 01:30 UTC (CET)
        let before_both = Utc.with_ymd_and_hms(2024, 10, 26, 23, 0, 0).unwrap();
        let between = Utc.with_ymd_and_hms(2024, 10, 27, 0, 45, 0).unwrap();
        let after_both = Utc.with_ymd_and_hms(2024, 10, 27, 1, 45, 0).unwrap();

        let first = parse_instant("02:30", before_both, berlin).unwrap();
        assert_eq!(first.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());

        let second = parse_instant("02:30", between, berlin).unwrap();
        assert_eq!(second.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 10, 27, 1, 30, 0).unwrap());

        let next_day = parse_instant("02:30", after_both, berlin).unwrap();
        assert_eq!(next_day.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 10, 28, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_result_is_in_configured_zone() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let instant = parse_instant("2024-05-02 10:00", now, TZ).unwrap();
        assert_eq!(instant.timezone(), TZ);
        assert_eq!(instant.with_timezone(&Utc).format("%H:%M").to_string(), "06:00");
    }

    #[test]
    fn test_text_and_trailing_datetime() {
        let now = now_at("2024-05-01 12:00:00");
        let (text, when) = parse_text_and_instant("buy milk 2024-05-02 10:00", now, TZ).unwrap();
        assert_eq!(text, "buy milk");
        assert_eq!(when, local("2024-05-02 10:00"));

        let (text, when) = parse_text_and_instant("  call mom   18:30 ", now, TZ).unwrap();
        assert_eq!(text, "call mom");
        assert_eq!(when, local("2024-05-01 18:30"));
    }

    #[test]
    fn test_text_and_instant_keeps_multiline_text() {
        let now = now_at("2024-05-01 12:00:00");
        let (text, when) =
            parse_text_and_instant("shopping:\nmilk\nbread 2024-05-02 10:00", now, TZ).unwrap();
        assert_eq!(text, "shopping:\nmilk\nbread");
        assert_eq!(when, local("2024-05-02 10:00"));
    }

    #[test]
    fn test_text_and_instant_needs_text() {
        let now = now_at("2024-05-01 12:00:00");
        assert_eq!(
            parse_text_and_instant("18:30", now, TZ),
            Err(ReminderError::EmptyText)
        );
        assert!(matches!(
            parse_text_and_instant("buy milk someday", now, TZ),
            Err(ReminderError::Format(_))
        ));
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("1", 2), Ok(1));
        assert_eq!(parse_index(" 2 ", 2), Ok(2));
        assert_eq!(parse_index("3", 2), Err(ReminderError::Range { index: 3, len: 2 }));
        assert_eq!(parse_index("0", 2), Err(ReminderError::Range { index: 0, len: 2 }));
        assert_eq!(parse_index("two", 2), Err(ReminderError::Type("two".to_string())));
        assert_eq!(parse_index("-1", 2), Err(ReminderError::Type("-1".to_string())));
        assert!(matches!(
            parse_index("99999999999999999999999", 2),
            Err(ReminderError::Range { .. })
        ));
    }

    #[test]
    fn test_format_instant() {
        assert_eq!(format_instant(&local("2099-01-01 10:00")), "2099-01-01 10:00");
    }
}
