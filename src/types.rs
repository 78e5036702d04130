// src/types.rs
// Trade lifecycle event model shared by the normalizer, store, projector and read model

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Entry,
    MfeUpdate,
    BeTriggered,
    ExitBreakEven,
    ExitStopLoss,
    Cancelled,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Entry,
        EventType::MfeUpdate,
        EventType::BeTriggered,
        EventType::ExitBreakEven,
        EventType::ExitStopLoss,
        EventType::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Entry => "ENTRY",
            EventType::MfeUpdate => "MFE_UPDATE",
            EventType::BeTriggered => "BE_TRIGGERED",
            EventType::ExitBreakEven => "EXIT_BREAK_EVEN",
            EventType::ExitStopLoss => "EXIT_STOP_LOSS",
            EventType::Cancelled => "CANCELLED",
        }
    }

    /// Tie-break order for events sharing one timestamp.
    pub fn sequence_rank(&self) -> u8 {
        match self {
            EventType::Entry => 0,
            EventType::MfeUpdate => 1,
            EventType::BeTriggered => 2,
            EventType::ExitBreakEven => 3,
            EventType::ExitStopLoss => 4,
            EventType::Cancelled => 5,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "BULLISH",
            Direction::Bearish => "BEARISH",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BULLISH" | "LONG" | "BUY" => Ok(Direction::Bullish),
            "BEARISH" | "SHORT" | "SELL" => Ok(Direction::Bearish),
            _ => Err(s.to_string()),
        }
    }
}

/// One of the two stop-management simulations run over the same signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Variant {
    /// Stop moves to entry once 1R is reached.
    Be1,
    /// Stop never moves.
    NoBe,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Be1 => write!(f, "BE1"),
            Variant::NoBe => write!(f, "NO_BE"),
        }
    }
}

/// Which variant(s) an exit event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantScope {
    Be1,
    NoBe,
    Both,
}

impl VariantScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantScope::Be1 => "BE1",
            VariantScope::NoBe => "NO_BE",
            VariantScope::Both => "BOTH",
        }
    }

    pub fn includes(&self, variant: Variant) -> bool {
        match self {
            VariantScope::Both => true,
            VariantScope::Be1 => variant == Variant::Be1,
            VariantScope::NoBe => variant == Variant::NoBe,
        }
    }
}

impl FromStr for VariantScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .to_ascii_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '=')
            .collect();
        match cleaned.as_str() {
            "BE1" | "BE=1" | "BREAKEVEN" => Ok(VariantScope::Be1),
            "NOBE" => Ok(VariantScope::NoBe),
            "BOTH" | "ALL" => Ok(VariantScope::Both),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantPhase {
    AwaitingEntry,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletedReason {
    StopLoss,
    BreakEvenStop,
    Cancelled,
}

/// Identity used for idempotent appends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub trade_id: String,
    pub event_timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub variant: Option<VariantScope>,
}

/// An immutable lifecycle event as delivered by the indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeEvent {
    pub trade_id: String,
    pub event_type: EventType,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantScope>,
    pub entry_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub current_price: Option<Decimal>,
    pub be_mfe_r: Option<Decimal>,
    pub no_be_mfe_r: Option<Decimal>,
    pub mae_r: Option<Decimal>,
    pub signal_date: Option<NaiveDate>,
    pub signal_time: Option<NaiveTime>,
    pub event_timestamp: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
    pub payload_sha256: String,
}

impl TradeEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            trade_id: self.trade_id.clone(),
            event_timestamp: self.event_timestamp,
            event_type: self.event_type,
            variant: self.variant,
        }
    }

    /// `|entry - stop|`, only meaningful on the ENTRY event. `None` when it
    /// does not fit in a `Decimal`.
    pub fn risk_distance(&self) -> Option<Decimal> {
        match (self.entry_price, self.stop_loss_price) {
            (Some(entry), Some(stop)) => entry.checked_sub(stop).map(|d| d.abs()),
            _ => None,
        }
    }

    /// Whether this event ends `variant` when it is applied.
    pub fn terminates(&self, variant: Variant) -> bool {
        match self.event_type {
            EventType::Cancelled => true,
            EventType::ExitBreakEven => variant == Variant::Be1,
            EventType::ExitStopLoss => self
                .variant
                .map_or(true, |scope| scope.includes(variant)),
            _ => false,
        }
    }
}

/// Builder for assembling events in code paths that do not start from a webhook
/// payload (tests and the replay tool).
pub struct TradeEventBuilder {
    event: TradeEvent,
}

impl TradeEventBuilder {
    pub fn new(
        trade_id: impl Into<String>,
        event_type: EventType,
        direction: Direction,
        event_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event: TradeEvent {
                trade_id: trade_id.into(),
                event_type,
                direction,
                variant: None,
                entry_price: None,
                stop_loss_price: None,
                current_price: None,
                be_mfe_r: None,
                no_be_mfe_r: None,
                mae_r: None,
                signal_date: None,
                signal_time: None,
                event_timestamp,
                raw_payload: serde_json::Value::Null,
                payload_sha256: String::new(),
            },
        }
    }

    pub fn prices(mut self, entry_price: Decimal, stop_loss_price: Decimal) -> Self {
        self.event.entry_price = Some(entry_price);
        self.event.stop_loss_price = Some(stop_loss_price);
        self
    }

    pub fn current_price(mut self, price: Decimal) -> Self {
        self.event.current_price = Some(price);
        self
    }

    pub fn excursions(
        mut self,
        be_mfe_r: Option<Decimal>,
        no_be_mfe_r: Option<Decimal>,
        mae_r: Option<Decimal>,
    ) -> Self {
        self.event.be_mfe_r = be_mfe_r;
        self.event.no_be_mfe_r = no_be_mfe_r;
        self.event.mae_r = mae_r;
        self
    }

    pub fn variant(mut self, scope: VariantScope) -> Self {
        self.event.variant = Some(scope);
        self
    }

    pub fn signal_time(mut self, date: NaiveDate, time: NaiveTime) -> Self {
        self.event.signal_date = Some(date);
        self.event.signal_time = Some(time);
        self
    }

    pub fn raw_payload(mut self, payload: serde_json::Value) -> Self {
        self.event.payload_sha256 = crate::normalizer::fingerprint(&payload);
        self.event.raw_payload = payload;
        self
    }

    pub fn build(self) -> TradeEvent {
        self.event
    }
}
