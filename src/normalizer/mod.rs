// src/normalizer/mod.rs
// Turns raw indicator webhook payloads (single or batched) into typed TradeEvents

pub mod fields;
pub mod trade_id;

use crate::errors::ValidationError;
use crate::types::{Direction, EventType, TradeEvent, VariantScope};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use fields::{
    adverse_r, decimal_field, favorable_r, string_field, timestamp_field, truncate_to_micros,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use trade_id::{parse_signal_date, parse_signal_time, ParsedTradeId};
use tracing::debug;

pub use trade_id::{display_signal_time, local_to_utc, utc_to_local};

pub const BATCH_EVENT_TYPE: &str = "MFE_UPDATE_BATCH";

const EVENT_TYPE_KEYS: &[&str] = &["event_type", "type", "event"];
const TRADE_ID_KEYS: &[&str] = &["trade_id", "tradeId", "signal_id"];
const DIRECTION_KEYS: &[&str] = &["direction", "bias", "signal_type"];
const ENTRY_PRICE_KEYS: &[&str] = &["entry_price", "entry"];
const STOP_PRICE_KEYS: &[&str] = &["stop_loss_price", "stop_loss", "sl_price"];
const CURRENT_PRICE_KEYS: &[&str] = &["current_price", "price", "exit_price"];
const BE_MFE_KEYS: &[&str] = &["be_mfe_r", "be_mfe", "be1_mfe"];
const NO_BE_MFE_KEYS: &[&str] = &["no_be_mfe_r", "no_be_mfe", "nobe_mfe"];
const MAE_KEYS: &[&str] = &["mae_r", "mae", "mae_global_r"];
const VARIANT_KEYS: &[&str] = &["variant", "strategy", "be_variant"];
const TIMESTAMP_KEYS: &[&str] = &["event_timestamp", "timestamp", "event_time"];
const DATE_KEYS: &[&str] = &["signal_date", "date"];
const TIME_KEYS: &[&str] = &["signal_time", "time"];

/// One payload item that could not be normalized.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<String>,
    pub error: String,
    #[serde(skip)]
    pub cause: Option<ValidationError>,
}

#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub is_batch: bool,
    pub events: Vec<TradeEvent>,
    pub rejections: Vec<Rejection>,
}

/// Normalizes a webhook body.
///
/// Envelope problems (not an object, `signals` not an array) fail the whole call;
/// problems with individual items land in `rejections` and never fail the batch.
/// `received_at` is only used as the event time of non-ENTRY events that carry no
/// timestamp of their own. Such events key on the receive time, so a retried
/// delivery is stored again; the projector keeps the first exit and flags the
/// rest as `DuplicateExit`.
pub fn normalize_payload(
    payload: &Value,
    signal_tz: Tz,
    received_at: DateTime<Utc>,
) -> Result<NormalizedBatch, ValidationError> {
    let obj = payload.as_object().ok_or(ValidationError::NotAnObject)?;
    let received_at = truncate_to_micros(received_at);

    let envelope_type = string_field(obj, EVENT_TYPE_KEYS);
    let is_batch = obj.contains_key("signals")
        || envelope_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(BATCH_EVENT_TYPE));

    let mut batch = NormalizedBatch {
        is_batch,
        ..Default::default()
    };

    if !is_batch {
        match normalize_event(obj, None, None, signal_tz, received_at) {
            Ok(event) => batch.events.push(event),
            Err(e) => batch.rejections.push(Rejection {
                index: 0,
                trade_id: string_field(obj, TRADE_ID_KEYS),
                error: e.to_string(),
                cause: Some(e),
            }),
        }
        return Ok(batch);
    }

    let signals = obj
        .get("signals")
        .and_then(Value::as_array)
        .ok_or(ValidationError::InvalidBatch)?;

    // Items of an MFE_UPDATE_BATCH may omit their own type and timestamp.
    let default_type = Some(EventType::MfeUpdate);
    let envelope_ts = timestamp_field(obj, TIMESTAMP_KEYS)?;

    for (index, item) in signals.iter().enumerate() {
        let result = item
            .as_object()
            .ok_or(ValidationError::NotAnObject)
            .and_then(|item_obj| {
                normalize_event(item_obj, default_type, envelope_ts, signal_tz, received_at)
            });
        match result {
            Ok(event) => batch.events.push(event),
            Err(e) => {
                debug!("Batch item {} rejected: {}", index, e);
                batch.rejections.push(Rejection {
                    index,
                    trade_id: item.as_object().and_then(|o| string_field(o, TRADE_ID_KEYS)),
                    error: e.to_string(),
                    cause: Some(e),
                });
            }
        }
    }

    Ok(batch)
}

/// Normalizes one event object.
pub fn normalize_event(
    obj: &Map<String, Value>,
    default_type: Option<EventType>,
    default_ts: Option<DateTime<Utc>>,
    signal_tz: Tz,
    received_at: DateTime<Utc>,
) -> Result<TradeEvent, ValidationError> {
    let event_type = match string_field(obj, EVENT_TYPE_KEYS) {
        Some(raw) => raw
            .parse::<EventType>()
            .map_err(ValidationError::UnknownEventType)?,
        None => default_type.ok_or(ValidationError::MissingEventType)?,
    };

    let trade_id = string_field(obj, TRADE_ID_KEYS).ok_or(ValidationError::MissingTradeId)?;
    let parsed_id = ParsedTradeId::parse(&trade_id)?;

    let direction = match string_field(obj, DIRECTION_KEYS) {
        Some(raw) => {
            let stated = raw
                .parse::<Direction>()
                .map_err(|_| ValidationError::UnknownDirection(raw.clone()))?;
            if stated != parsed_id.direction {
                debug!(
                    "Payload direction {} disagrees with trade_id {}, keeping trade_id",
                    raw, trade_id
                );
            }
            parsed_id.direction
        }
        None => parsed_id.direction,
    };

    let entry_price = decimal_field(obj, ENTRY_PRICE_KEYS, "entry_price")?;
    let stop_loss_price = decimal_field(obj, STOP_PRICE_KEYS, "stop_loss_price")?;
    let current_price = decimal_field(obj, CURRENT_PRICE_KEYS, "current_price")?;

    if event_type == EventType::Entry {
        let entry = entry_price.ok_or(ValidationError::MissingPrice("entry_price"))?;
        let stop = stop_loss_price.ok_or(ValidationError::MissingPrice("stop_loss_price"))?;
        if entry == stop {
            return Err(ValidationError::ZeroRisk);
        }
        if entry.checked_sub(stop).is_none() {
            return Err(ValidationError::RiskOverflow);
        }
    }

    let be_mfe_r = favorable_r(decimal_field(obj, BE_MFE_KEYS, "be_mfe_r")?);
    let no_be_mfe_r = favorable_r(decimal_field(obj, NO_BE_MFE_KEYS, "no_be_mfe_r")?);
    let mae_r = adverse_r(decimal_field(obj, MAE_KEYS, "mae_r")?);

    let variant = match (event_type, string_field(obj, VARIANT_KEYS)) {
        (EventType::ExitStopLoss, Some(raw)) => Some(
            raw.parse::<VariantScope>()
                .map_err(ValidationError::UnknownVariant)?,
        ),
        _ => None,
    };

    let signal_date = match string_field(obj, DATE_KEYS) {
        Some(raw) => parse_signal_date(&raw).ok_or(ValidationError::InvalidTimestamp {
            field: "date",
            value: raw,
        })?,
        None => parsed_id.date,
    };
    let signal_time = match string_field(obj, TIME_KEYS) {
        Some(raw) => parse_signal_time(&raw).ok_or(ValidationError::InvalidTimestamp {
            field: "time",
            value: raw,
        })?,
        None => parsed_id.time,
    };

    let event_timestamp = match timestamp_field(obj, TIMESTAMP_KEYS)?.or(default_ts) {
        Some(ts) => ts,
        None if event_type == EventType::Entry => {
            truncate_to_micros(local_to_utc(signal_date.and_time(signal_time), signal_tz))
        }
        None => received_at,
    };

    let raw_payload = Value::Object(obj.clone());
    let payload_sha256 = fingerprint(&raw_payload);

    Ok(TradeEvent {
        trade_id,
        event_type,
        direction,
        variant,
        entry_price,
        stop_loss_price,
        current_price,
        be_mfe_r,
        no_be_mfe_r,
        mae_r,
        signal_date: Some(signal_date),
        signal_time: Some(signal_time),
        event_timestamp,
        raw_payload,
        payload_sha256,
    })
}

/// SHA-256 hex digest of the canonical JSON encoding of a payload.
pub fn fingerprint(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;

    const NY: Tz = chrono_tz::America::New_York;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 12, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_entry_event_derives_time_from_trade_id() {
        let payload = json!({
            "event_type": "ENTRY",
            "trade_id": "20250612_093000000_BULLISH",
            "entry_price": 100.0,
            "stop_loss_price": "90"
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        assert!(!batch.is_batch);
        assert!(batch.rejections.is_empty());
        let event = &batch.events[0];
        assert_eq!(event.event_type, EventType::Entry);
        assert_eq!(event.direction, Direction::Bullish);
        assert_eq!(event.risk_distance(), Some(dec!(10)));
        assert_eq!(event.signal_date, NaiveDate::from_ymd_opt(2025, 6, 12));
        assert_eq!(event.signal_time, NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(event.event_timestamp.to_rfc3339(), "2025-06-12T13:30:00+00:00");
        assert_eq!(event.payload_sha256.len(), 64);
    }

    #[test]
    fn test_legacy_date_time_fields_take_precedence() {
        let payload = json!({
            "event_type": "ENTRY",
            "trade_id": "20250612_093000000_BEARISH",
            "date": "2025-06-12",
            "time": "09:31:15",
            "entry": 100,
            "stop_loss": 105
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        let event = &batch.events[0];
        assert_eq!(event.signal_time, NaiveTime::from_hms_opt(9, 31, 15));
        assert_eq!(event.direction, Direction::Bearish);
    }

    #[test]
    fn test_entry_without_prices_is_rejected() {
        let payload = json!({
            "event_type": "ENTRY",
            "trade_id": "20250612_093000000_BULLISH",
            "entry_price": "abc",
            "stop_loss_price": 90
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        assert!(batch.events.is_empty());
        assert!(matches!(
            batch.rejections[0].cause,
            Some(ValidationError::InvalidNumber { field: "entry_price", .. })
        ));

        let missing_stop = json!({
            "event_type": "ENTRY",
            "trade_id": "20250612_093000000_BULLISH",
            "entry_price": 100
        });
        let batch = normalize_payload(&missing_stop, NY, received()).unwrap();
        assert_eq!(
            batch.rejections[0].cause,
            Some(ValidationError::MissingPrice("stop_loss_price"))
        );
    }

    #[test]
    fn test_entry_with_unrepresentable_risk_is_rejected() {
        let payload = json!({
            "event_type": "ENTRY",
            "trade_id": "20250612_093000000_BULLISH",
            "entry_price": "79228162514264337593543950335",
            "stop_loss_price": "-79228162514264337593543950335"
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        assert!(batch.events.is_empty());
        assert_eq!(batch.rejections[0].cause, Some(ValidationError::RiskOverflow));
    }

    #[test]
    fn test_payload_direction_must_be_known() {
        let payload = json!({
            "event_type": "MFE_UPDATE",
            "trade_id": "20250612_093000000_BULLISH",
            "direction": "bearish",
            "be_mfe_r": 0.5
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        assert_eq!(batch.events[0].direction, Direction::Bullish);

        let bad = json!({
            "event_type": "MFE_UPDATE",
            "trade_id": "20250612_093000000_BULLISH",
            "direction": "sideways"
        });
        let batch = normalize_payload(&bad, NY, received()).unwrap();
        assert_eq!(
            batch.rejections[0].cause,
            Some(ValidationError::UnknownDirection("sideways".to_string()))
        );
    }

    #[test]
    fn test_unknown_and_missing_event_type() {
        let unknown = json!({"event_type": "PARTIAL_FILL", "trade_id": "20250612_093000000_BULLISH"});
        let batch = normalize_payload(&unknown, NY, received()).unwrap();
        assert_eq!(
            batch.rejections[0].cause,
            Some(ValidationError::UnknownEventType("PARTIAL_FILL".to_string()))
        );

        let missing = json!({"trade_id": "20250612_093000000_BULLISH"});
        let batch = normalize_payload(&missing, NY, received()).unwrap();
        assert_eq!(batch.rejections[0].cause, Some(ValidationError::MissingEventType));
    }

    #[test]
    fn test_batch_keeps_going_past_bad_items() {
        let payload = json!({
            "event_type": "MFE_UPDATE_BATCH",
            "timestamp": "2025-06-12T14:00:00Z",
            "signals": [
                {"trade_id": "20250612_093000000_BULLISH", "be_mfe": 0.5, "no_be_mfe": 0.6, "mae": -0.1},
                {"trade_id": "garbage", "be_mfe": 0.5},
                {"trade_id": "20250612_094500000_BEARISH", "event_type": "MFE_UPDATE",
                 "be_mfe_r": "1.1", "timestamp": "2025-06-12T14:00:05Z"},
                "not an object"
            ]
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        assert!(batch.is_batch);
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.rejections.len(), 2);
        assert_eq!(batch.rejections[0].index, 1);
        assert_eq!(batch.rejections[0].trade_id.as_deref(), Some("garbage"));
        assert_eq!(batch.rejections[1].index, 3);

        let first = &batch.events[0];
        assert_eq!(first.event_type, EventType::MfeUpdate);
        assert_eq!(first.mae_r, Some(dec!(0.1)));
        assert_eq!(first.event_timestamp.to_rfc3339(), "2025-06-12T14:00:00+00:00");
        assert_eq!(
            batch.events[1].event_timestamp.to_rfc3339(),
            "2025-06-12T14:00:05+00:00"
        );
    }

    #[test]
    fn test_batch_signals_must_be_array() {
        let payload = json!({"event_type": "MFE_UPDATE_BATCH", "signals": {"a": 1}});
        assert_eq!(
            normalize_payload(&payload, NY, received()).unwrap_err(),
            ValidationError::InvalidBatch
        );
        assert_eq!(
            normalize_payload(&json!([1, 2]), NY, received()).unwrap_err(),
            ValidationError::NotAnObject
        );
    }

    #[test]
    fn test_stop_loss_variant_scope() {
        let payload = json!({
            "event_type": "EXIT_STOP_LOSS",
            "trade_id": "20250612_093000000_BULLISH",
            "variant": "NO_BE",
            "no_be_mfe_r": 2.8
        });
        let batch = normalize_payload(&payload, NY, received()).unwrap();
        assert_eq!(batch.events[0].variant, Some(VariantScope::NoBe));
        assert_eq!(batch.events[0].event_timestamp, received());

        let bad = json!({
            "event_type": "EXIT_STOP_LOSS",
            "trade_id": "20250612_093000000_BULLISH",
            "variant": "HALF"
        });
        let batch = normalize_payload(&bad, NY, received()).unwrap();
        assert_eq!(
            batch.rejections[0].cause,
            Some(ValidationError::UnknownVariant("HALF".to_string()))
        );
    }

    #[test]
    fn test_fingerprint_is_key_order_independent() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&json!({"a": 1, "b": 3})));
    }
}
