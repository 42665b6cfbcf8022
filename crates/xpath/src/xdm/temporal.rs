//! Lexical forms of the date, time and duration types.

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Splits a trailing `Z` or `±hh:mm` timezone off a lexical value.
pub fn split_timezone(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(rest) = s.strip_suffix('Z') {
        return Some((rest, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 6 {
        let sign_at = bytes.len() - 6;
        let sign = bytes[sign_at];
        if (sign == b'+' || sign == b'-') && bytes[bytes.len() - 3] == b':' {
            let hours: i32 = s[sign_at + 1..sign_at + 3].parse().ok()?;
            let minutes: i32 = s[sign_at + 4..].parse().ok()?;
            if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
                return None;
            }
            let mut secs = hours * 3600 + minutes * 60;
            if sign == b'-' {
                secs = -secs;
            }
            return Some((&s[..sign_at], Some(FixedOffset::east_opt(secs)?)));
        }
    }
    Some((s, None))
}

fn parse_date_part(s: &str) -> Option<NaiveDate> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[5..7].parse().ok()?;
    let day: u32 = s[8..10].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time_part(s: &str) -> Option<(NaiveTime, bool)> {
    let b = s.as_bytes();
    if b.len() < 8 || b[2] != b':' || b[5] != b':' {
        return None;
    }
    let hour: u32 = s[0..2].parse().ok()?;
    let minute: u32 = s[3..5].parse().ok()?;
    let second: u32 = s[6..8].parse().ok()?;
    let nanos = match &s[8..] {
        "" => 0,
        frac => {
            let digits = frac.strip_prefix('.')?;
            if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let mut padded: String = digits.chars().take(9).collect();
            while padded.len() < 9 {
                padded.push('0');
            }
            padded.parse::<u32>().ok()?
        }
    };
    if hour == 24 {
        return (minute == 0 && second == 0 && nanos == 0).then_some((NaiveTime::MIN, true));
    }
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).map(|t| (t, false))
}

pub fn parse_date(s: &str) -> Option<(NaiveDate, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s.trim())?;
    Some((parse_date_part(body)?, tz))
}

pub fn parse_time(s: &str) -> Option<(NaiveTime, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s.trim())?;
    let (time, _) = parse_time_part(body)?;
    Some((time, tz))
}

pub fn parse_datetime(s: &str) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let (body, tz) = split_timezone(s.trim())?;
    let (date, time) = body.split_once('T')?;
    let date = parse_date_part(date)?;
    let (time, end_of_day) = parse_time_part(time)?;
    let mut value = date.and_time(time);
    if end_of_day {
        value += chrono::Duration::days(1);
    }
    Some((value, tz))
}

/// Parses `xs:duration` into (months, milliseconds); both carry the sign.
pub fn parse_duration(s: &str) -> Option<(i32, i64)> {
    let s = s.trim();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let rest = rest.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => {
            if t.is_empty() {
                return None;
            }
            (d, Some(t))
        }
        None => (rest, None),
    };
    if date_part.is_empty() && time_part.is_none() {
        return None;
    }
    let mut months: i64 = 0;
    let mut millis: i64 = 0;
    let mut seen_any = false;

    let mut order = ['Y', 'M', 'D'].iter();
    let mut num = String::new();
    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            num.push(ch);
            continue;
        }
        if num.is_empty() {
            return None;
        }
        loop {
            let expected = *order.next()?;
            if expected == ch {
                break;
            }
        }
        let n: i64 = num.parse().ok()?;
        match ch {
            'Y' => months = months.checked_add(n.checked_mul(12)?)?,
            'M' => months = months.checked_add(n)?,
            'D' => millis = millis.checked_add(n.checked_mul(MILLIS_PER_DAY)?)?,
            _ => return None,
        }
        num.clear();
        seen_any = true;
    }
    if !num.is_empty() {
        return None;
    }
    if let Some(time) = time_part {
        let mut order = ['H', 'M', 'S'].iter();
        for ch in time.chars() {
            if ch.is_ascii_digit() || ch == '.' {
                num.push(ch);
                continue;
            }
            if num.is_empty() {
                return None;
            }
            loop {
                let expected = *order.next()?;
                if expected == ch {
                    break;
                }
            }
            match ch {
                'H' => millis = millis.checked_add(num.parse::<i64>().ok()?.checked_mul(MILLIS_PER_HOUR)?)?,
                'M' => {
                    millis = millis.checked_add(num.parse::<i64>().ok()?.checked_mul(MILLIS_PER_MINUTE)?)?;
                }
                'S' => {
                    let secs: f64 = num.parse().ok()?;
                    #[allow(clippy::cast_possible_truncation)]
                    let ms = (secs * 1000.0).round() as i64;
                    millis = millis.checked_add(ms)?;
                }
                _ => return None,
            }
            num.clear();
            seen_any = true;
        }
        if !num.is_empty() {
            return None;
        }
    }
    if !seen_any {
        return None;
    }
    let months = i32::try_from(months).ok()?;
    if negative { Some((-months, -millis)) } else { Some((months, millis)) }
}

pub fn parse_day_time_duration(s: &str) -> Option<i64> {
    let (months, millis) = parse_duration(s)?;
    let body = s.trim().trim_start_matches('-').strip_prefix('P')?;
    let date_part = body.split('T').next().unwrap_or("");
    if months != 0 || date_part.contains('Y') || date_part.contains('M') {
        return None;
    }
    Some(millis)
}

pub fn parse_year_month_duration(s: &str) -> Option<i32> {
    let (months, millis) = parse_duration(s)?;
    if millis != 0 || s.contains('T') || s.contains('D') {
        return None;
    }
    Some(months)
}

pub fn format_timezone(tz: Option<FixedOffset>) -> String {
    match tz {
        None => String::new(),
        Some(off) => {
            let secs = off.local_minus_utc();
            if secs == 0 {
                return "Z".to_string();
            }
            let sign = if secs < 0 { '-' } else { '+' };
            let secs = secs.abs();
            format!("{sign}{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
        }
    }
}

fn format_seconds(second: u32, nanos: u32) -> String {
    if nanos == 0 {
        return format!("{second:02}");
    }
    let frac = format!("{nanos:09}");
    format!("{second:02}.{}", frac.trim_end_matches('0'))
}

pub fn format_date(date: NaiveDate, tz: Option<FixedOffset>) -> String {
    format!("{:04}-{:02}-{:02}{}", date.year(), date.month(), date.day(), format_timezone(tz))
}

pub fn format_time(time: NaiveTime, tz: Option<FixedOffset>) -> String {
    format!(
        "{:02}:{:02}:{}{}",
        time.hour(),
        time.minute(),
        format_seconds(time.second(), time.nanosecond()),
        format_timezone(tz)
    )
}

pub fn format_datetime(value: NaiveDateTime, tz: Option<FixedOffset>) -> String {
    format!(
        "{}T{}",
        format_date(value.date(), None),
        format_time(value.time(), tz)
    )
}

fn format_day_time_body(millis: i64, out: &mut String) {
    let days = millis / MILLIS_PER_DAY;
    let mut rest = millis % MILLIS_PER_DAY;
    if days != 0 {
        out.push_str(&format!("{days}D"));
    }
    if rest == 0 {
        return;
    }
    out.push('T');
    let hours = rest / MILLIS_PER_HOUR;
    rest %= MILLIS_PER_HOUR;
    let minutes = rest / MILLIS_PER_MINUTE;
    rest %= MILLIS_PER_MINUTE;
    if hours != 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes != 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if rest != 0 {
        let secs = rest / MILLIS_PER_SECOND;
        let ms = rest % MILLIS_PER_SECOND;
        if ms == 0 {
            out.push_str(&format!("{secs}S"));
        } else {
            let frac = format!("{ms:03}");
            out.push_str(&format!("{secs}.{}S", frac.trim_end_matches('0')));
        }
    }
}

pub fn format_duration(months: i32, millis: i64) -> String {
    if months == 0 && millis == 0 {
        return "PT0S".to_string();
    }
    let mut out = String::new();
    if months < 0 || millis < 0 {
        out.push('-');
    }
    out.push('P');
    let months = months.unsigned_abs();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        out.push_str(&format!("{years}Y"));
    }
    if months != 0 {
        out.push_str(&format!("{months}M"));
    }
    format_day_time_body(millis.abs(), &mut out);
    out
}

pub fn format_year_month_duration(months: i32) -> String {
    if months == 0 { "P0M".to_string() } else { format_duration(months, 0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse_into_months_and_millis() {
        assert_eq!(parse_duration("P1Y2M3DT4H5M6.5S"), Some((14, 273_906_500)));
        assert_eq!(parse_duration("-PT1M"), Some((0, -60_000)));
        assert_eq!(parse_duration("P"), None);
        assert_eq!(parse_duration("PT"), None);
        assert_eq!(parse_duration("P1S"), None);
        assert_eq!(parse_day_time_duration("P1Y"), None);
        assert_eq!(parse_year_month_duration("P2Y1M"), Some(25));
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(format_duration(14, 273_906_500), "P1Y2M3DT4H5M6.5S");
        assert_eq!(format_duration(0, 0), "PT0S");
        assert_eq!(format_year_month_duration(0), "P0M");
        let (d, tz) = parse_date("2024-02-29+01:30").expect("date");
        assert_eq!(format_date(d, tz), "2024-02-29+01:30");
        let (dt, tz) = parse_datetime("2000-01-01T24:00:00Z").expect("dateTime");
        assert_eq!(format_datetime(dt, tz), "2000-01-02T00:00:00Z");
    }
}
