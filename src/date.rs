//! Epoch-second helpers: ISO-8601 rendering/parsing and day arithmetic.

use anyhow::{anyhow, Result};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

const SECONDS_PER_DAY: i64 = 86_400;

/// Render epoch seconds as `YYYY-MM-DDTHH:MM:SS` (UTC, no offset).
/// Out-of-range values fall back to the raw number.
pub fn to_iso(epoch: i64) -> String {
    let fmt = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|dt| dt.format(&fmt).ok())
        .unwrap_or_else(|| epoch.to_string())
}

/// Parse an ISO-8601 timestamp into epoch seconds.
/// Accepts RFC 3339 (`2020-01-01T00:00:00+01:00`, `...Z`) and the naive
/// `YYYY-MM-DDTHH:MM:SS` form, which is read as UTC.
pub fn from_iso(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt.unix_timestamp());
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let dt = PrimitiveDateTime::parse(s, &naive)
        .map_err(|e| anyhow!("invalid ISO-8601 timestamp {s:?}: {e}"))?;
    Ok(dt.assume_utc().unix_timestamp())
}

pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Add `days` to an epoch. Non-positive values leave the date unchanged.
pub fn add_days(epoch: i64, days: i64) -> i64 {
    if days <= 0 {
        tracing::debug!("date not modified (days = {days})");
        return epoch;
    }
    epoch.saturating_add(days.saturating_mul(SECONDS_PER_DAY))
}

/// Subtract `days` from an epoch. Non-positive values leave the date unchanged.
pub fn sub_days(epoch: i64, days: i64) -> i64 {
    if days <= 0 {
        tracing::debug!("date not modified (days = {days})");
        return epoch;
    }
    epoch.saturating_sub(days.saturating_mul(SECONDS_PER_DAY))
}

/// UTC hour (0..=23) and month (1..=12) of an epoch.
pub fn hour_and_month(epoch: i64) -> Option<(u8, u8)> {
    let dt = OffsetDateTime::from_unix_timestamp(epoch).ok()?;
    Some((dt.hour(), u8::from(dt.month())))
}

/// Whole days between two epochs (absolute).
pub fn days_between(a: i64, b: i64) -> i64 {
    (a - b).abs() / Duration::DAY.whole_seconds()
}
