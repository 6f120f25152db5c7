//! APRS packet timestamps.
//!
//! Three wire forms, resolved against a receipt-time hint:
//! `DDHHMM` followed by `z` (zulu) or `/` (local, treated as zulu),
//! `HHMMSS` followed by `h`, and an 8-digit `MMDDHHMM`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};

/// Parse a timestamp at the start of `payload`.
///
/// Returns the resolved UTC instant and the number of consumed characters
/// (7 or 8, all ASCII), or `None` when no recognised form is present.
pub fn take_timestamp(payload: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, usize)> {
    let head: Vec<char> = payload.chars().take(8).collect();

    if head.len() == 8 && head.iter().all(|c| c.is_ascii_digit()) {
        return parse_month_day(&payload[..8], now).map(|t| (t, 8));
    }
    if head.len() >= 7 {
        if !head[..6].iter().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let digits: String = head[..6].iter().collect();
        return match head[6] {
            'z' | '/' => parse_day_hour_minute(&digits, now).map(|t| (t, 7)),
            'h' => parse_hour_minute_second(&digits, now).map(|t| (t, 7)),
            _ => None,
        };
    }
    None
}

/// `DDHHMM`: compose with the hint's year and month. A decoded day more
/// than one day ahead of the hint rolls back one month.
fn parse_day_hour_minute(digits: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let day: u32 = digits[0..2].parse().ok()?;
    let hour: u32 = digits[2..4].parse().ok()?;
    let minute: u32 = digits[4..6].parse().ok()?;

    let (mut year, mut month) = (now.year(), now.month());
    if day > now.day() + 1 {
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    compose(year, month, day, hour, minute, 0)
}

/// `HHMMSS` zulu on the hint's date.
fn parse_hour_minute_second(digits: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let hour: u32 = digits[0..2].parse().ok()?;
    let minute: u32 = digits[2..4].parse().ok()?;
    let second: u32 = digits[4..6].parse().ok()?;
    compose(now.year(), now.month(), now.day(), hour, minute, second)
}

/// `MMDDHHMM`: compose with the hint's year. A decoded month more than one
/// month ahead of the hint belongs to the previous year.
fn parse_month_day(digits: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let month: u32 = digits[0..2].parse().ok()?;
    let day: u32 = digits[2..4].parse().ok()?;
    let hour: u32 = digits[4..6].parse().ok()?;
    let minute: u32 = digits[6..8].parse().ok()?;

    let mut year = now.year();
    if month > now.month() + 1 {
        year -= 1;
    }
    compose(year, month, day, hour, minute, 0)
}

fn compose(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}
