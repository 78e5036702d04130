// src/normalizer/trade_id.rs
// All trade_id decoding and signal-zone time conversion lives here

use crate::errors::ValidationError;
use crate::types::Direction;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Fields encoded in `YYYYMMDD_HHMMSSfff_DIRECTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTradeId {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub direction: Direction,
}

impl ParsedTradeId {
    pub fn parse(trade_id: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedTradeId(trade_id.to_string());

        let mut parts = trade_id.trim().splitn(3, '_');
        let (date_part, time_part, direction_part) = match (parts.next(), parts.next(), parts.next()) {
            (Some(d), Some(t), Some(dir)) => (d, t, dir),
            _ => return Err(malformed()),
        };

        if date_part.len() != 8 || !date_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").map_err(|_| malformed())?;

        // Older indicator builds omitted the millisecond suffix.
        if !(time_part.len() == 9 || time_part.len() == 6)
            || !time_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        let field = |range: std::ops::Range<usize>| -> Result<u32, ValidationError> {
            time_part[range].parse::<u32>().map_err(|_| malformed())
        };
        let millis = if time_part.len() == 9 { field(6..9)? } else { 0 };
        let time = NaiveTime::from_hms_milli_opt(field(0..2)?, field(2..4)?, field(4..6)?, millis)
            .ok_or_else(malformed)?;

        let direction = direction_part
            .parse::<Direction>()
            .map_err(|_| malformed())?;

        Ok(Self {
            date,
            time,
            direction,
        })
    }

    pub fn local_datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Instant the signal fired, reading the encoded wall-clock time in `tz`.
    pub fn origin_utc(&self, tz: Tz) -> DateTime<Utc> {
        local_to_utc(self.local_datetime(), tz)
    }
}

/// Converts a wall-clock time in `tz` to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant; times inside a
/// spring-forward gap are shifted forward by the gap.
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => {
            let shifted = local + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&local))
        }
    }
}

/// Wall-clock date and time of `instant` in `tz`.
pub fn utc_to_local(instant: DateTime<Utc>, tz: Tz) -> (NaiveDate, NaiveTime) {
    let local = instant.with_timezone(&tz).naive_local();
    (local.date(), local.time())
}

/// Display string dashboards render for a signal, `YYYY-MM-DD HH:MM:SS`.
pub fn display_signal_time(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M:%S"))
}

pub fn parse_signal_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_signal_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M", "%H%M%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}
