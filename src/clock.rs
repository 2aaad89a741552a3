//! Civil date/time in one fixed named timezone.
//!
//! All wall-clock values (`"YYYY-MM-DD"` dates, `"HH:MM"` times) are
//! interpreted in [`CIVIL_TZ`], never in the host machine's local zone.
//! Every "what is today / now" decision in the crate goes through here.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::model::Ms;

/// The single civil timezone slots and bookings are expressed in.
pub const CIVIL_TZ: Tz = chrono_tz::Europe::Istanbul;

pub fn now_civil() -> DateTime<Tz> {
    Utc::now().with_timezone(&CIVIL_TZ)
}

/// Current civil date as a zero-padded `"YYYY-MM-DD"` string.
/// Zero-padding makes lexicographic order equal chronological order.
pub fn today() -> String {
    now_civil().format("%Y-%m-%d").to_string()
}

pub fn now_ms() -> Ms {
    Utc::now().timestamp_millis()
}

/// Minutes since local midnight in the civil timezone.
pub fn now_minutes() -> u32 {
    let t = now_civil();
    t.hour() * 60 + t.minute()
}

fn two_digits(s: &str) -> Option<u32> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Strict `"HH:MM"` → minutes since midnight. `None` for anything malformed
/// or out of range.
pub fn minutes_of(time: &str) -> Option<u32> {
    let (h, m) = time.split_once(':')?;
    let h = two_digits(h)?;
    let m = two_digits(m)?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Strict zero-padded `"YYYY-MM-DD"` parse.
pub fn parse_civil_date(date: &str) -> Option<NaiveDate> {
    if date.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Absolute instant (unix ms) of `date` + `time` in the civil timezone.
/// A wall-clock value falling in a DST gap resolves to the earliest valid
/// instant; `None` only for malformed input.
pub fn civil_instant(date: &str, time: &str) -> Option<Ms> {
    let d = parse_civil_date(date)?;
    let minutes = minutes_of(time)?;
    let t = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)?;
    CIVIL_TZ
        .from_local_datetime(&d.and_time(t))
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Is a slot starting at (`date`, `start_time`) already in the past?
///
/// A slot beginning in the current minute is NOT past. Malformed input is
/// treated as past (fails closed) so a corrupt record never looks bookable.
pub fn is_past(date: &str, start_time: &str) -> bool {
    let t = now_civil();
    is_past_at(
        date,
        start_time,
        &t.format("%Y-%m-%d").to_string(),
        t.hour() * 60 + t.minute(),
    )
}

/// Clock-injected variant of [`is_past`] for deterministic tests.
pub fn is_past_at(date: &str, start_time: &str, today: &str, now_minutes: u32) -> bool {
    if parse_civil_date(date).is_none() {
        return true;
    }
    let Some(slot_minutes) = minutes_of(start_time) else {
        return true;
    };
    match date.cmp(today) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => slot_minutes < now_minutes,
    }
}
