// src/normalizer/fields.rs
// Tolerant field extraction for the evolving indicator payload schema

use crate::errors::ValidationError;
use chrono::{DateTime, TimeZone, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Decimal places kept for R-multiples.
pub const R_SCALE: u32 = 4;

pub fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

pub fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first(obj, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a finite decimal. Absent (or empty string) is `Ok(None)`, anything
/// present but unparseable is an error.
pub fn decimal_field(
    obj: &Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<Option<Decimal>, ValidationError> {
    let value = match first(obj, keys) {
        Some(v) => v,
        None => return Ok(None),
    };
    let invalid = || ValidationError::InvalidNumber {
        field,
        value: value.to_string(),
    };
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid()),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| invalid())
}

pub fn round_r(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(R_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Favorable excursion is never below zero.
pub fn favorable_r(value: Option<Decimal>) -> Option<Decimal> {
    value.map(|v| round_r(v.max(Decimal::ZERO)))
}

/// Adverse excursion is kept as a magnitude regardless of the sign sent.
pub fn adverse_r(value: Option<Decimal>) -> Option<Decimal> {
    value.map(|v| round_r(v.abs()))
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or epoch milliseconds. Epoch values too
/// small to be milliseconds are read as seconds.
pub fn timestamp_field(
    obj: &Map<String, Value>,
    keys: &[&str],
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let value = match first(obj, keys) {
        Some(v) => v,
        None => return Ok(None),
    };
    let invalid = || ValidationError::InvalidTimestamp {
        field: "event_timestamp",
        value: value.to_string(),
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().and_then(epoch_to_utc),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(epoch_to_utc))
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                })
        }
        _ => None,
    };
    parsed.map(|ts| Some(truncate_to_micros(ts))).ok_or_else(invalid)
}

fn epoch_to_utc(raw: i64) -> Option<DateTime<Utc>> {
    // 1e11 ms is March 1973; anything smaller is seconds
    if raw.unsigned_abs() < 100_000_000_000 {
        Utc.timestamp_opt(raw, 0).single()
    } else {
        Utc.timestamp_millis_opt(raw).single()
    }
}

/// Postgres keeps microseconds; truncating up front keeps idempotency keys
/// identical across stores.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(ts.nanosecond() / 1_000 * 1_000)
        .unwrap_or(ts)
}
