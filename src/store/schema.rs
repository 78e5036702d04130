// src/store/schema.rs
// Postgres layout for the trade event log and row <-> TradeEvent mapping

use crate::errors::StoreError;
use crate::types::{Direction, EventType, TradeEvent, VariantScope};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;

/// Idempotent DDL run at startup. `variant` is '' for events that name no
/// variant so it can take part in the unique key.
pub const CREATE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS trade_events (
        id              BIGSERIAL PRIMARY KEY,
        trade_id        TEXT        NOT NULL,
        event_type      TEXT        NOT NULL,
        variant         TEXT        NOT NULL DEFAULT '',
        direction       TEXT        NOT NULL,
        entry_price     NUMERIC,
        stop_loss_price NUMERIC,
        current_price   NUMERIC,
        be_mfe_r        NUMERIC,
        no_be_mfe_r     NUMERIC,
        mae_r           NUMERIC,
        signal_date     DATE,
        signal_time     TIME,
        event_timestamp TIMESTAMPTZ NOT NULL,
        received_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        raw_payload     JSONB       NOT NULL,
        payload_sha256  TEXT        NOT NULL DEFAULT '',
        CONSTRAINT trade_events_idempotency
            UNIQUE (trade_id, event_timestamp, event_type, variant)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS trade_events_trade_ts
        ON trade_events (trade_id, event_timestamp, id)"#,
    r#"CREATE INDEX IF NOT EXISTS trade_events_type
        ON trade_events (event_type, trade_id)"#,
];

pub const EVENT_COLUMNS: &str = "trade_id, event_type, variant, direction, entry_price, \
     stop_loss_price, current_price, be_mfe_r, no_be_mfe_r, mae_r, signal_date, signal_time, \
     event_timestamp, raw_payload, payload_sha256";

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub trade_id: String,
    pub event_type: String,
    pub variant: String,
    pub direction: String,
    pub entry_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub be_mfe_r: Option<Decimal>,
    pub no_be_mfe_r: Option<Decimal>,
    pub mae_r: Option<Decimal>,
    // historical rows written before the date/time columns existed are NULL
    pub signal_date: Option<NaiveDate>,
    pub signal_time: Option<NaiveTime>,
    pub event_timestamp: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
    pub payload_sha256: String,
}

pub fn variant_column(scope: Option<VariantScope>) -> &'static str {
    scope.map_or("", |s| s.as_str())
}

impl TryFrom<EventRow> for TradeEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            trade_id: row.trade_id.clone(),
            reason,
        };
        let event_type = row
            .event_type
            .parse::<EventType>()
            .map_err(|v| corrupt(format!("event_type '{}'", v)))?;
        let direction = row
            .direction
            .parse::<Direction>()
            .map_err(|v| corrupt(format!("direction '{}'", v)))?;
        let variant = if row.variant.is_empty() {
            None
        } else {
            Some(
                row.variant
                    .parse::<VariantScope>()
                    .map_err(|v| corrupt(format!("variant '{}'", v)))?,
            )
        };

        Ok(TradeEvent {
            trade_id: row.trade_id,
            event_type,
            direction,
            variant,
            entry_price: row.entry_price,
            stop_loss_price: row.stop_loss_price,
            current_price: row.current_price,
            be_mfe_r: row.be_mfe_r,
            no_be_mfe_r: row.no_be_mfe_r,
            mae_r: row.mae_r,
            signal_date: row.signal_date,
            signal_time: row.signal_time,
            event_timestamp: row.event_timestamp,
            raw_payload: row.raw_payload,
            payload_sha256: row.payload_sha256,
        })
    }
}
