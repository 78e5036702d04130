// csv_writer.rs
use signal_tracker::read_model::{TradeSummary, VariantSummary};
use std::fs::File;
use tracing::info;

const HEADER: [&str; 21] = [
    "trade_id",
    "signal_time",
    "direction",
    "status",
    "entry_price",
    "stop_loss_price",
    "risk_distance",
    "be1_phase",
    "be1_max_favorable_r",
    "be1_max_adverse_r",
    "be1_completed_reason",
    "be1_completed_at",
    "be1_stop_at_entry",
    "no_be_phase",
    "no_be_max_favorable_r",
    "no_be_max_adverse_r",
    "no_be_completed_reason",
    "no_be_completed_at",
    "cancelled",
    "event_count",
    "anomaly_count",
];

pub struct CsvWriter {
    path: String,
}

impl CsvWriter {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn write_summaries(&self, trades: &[TradeSummary]) -> Result<(), Box<dyn std::error::Error>> {
        info!("Writing {} trades to CSV: {}", trades.len(), self.path);

        let file = File::create(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER)?;

        for trade in trades {
            let mut record = vec![
                trade.trade_id.clone(),
                trade.signal_time.clone(),
                trade.direction.to_string(),
                enum_text(&trade.status),
                opt(trade.entry_price),
                opt(trade.stop_loss_price),
                opt(trade.risk_distance),
            ];
            record.extend(variant_columns(&trade.be1, true));
            record.extend(variant_columns(&trade.no_be, false));
            record.push(trade.cancelled.to_string());
            record.push(trade.event_count.to_string());
            record.push(trade.anomaly_count.to_string());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("CSV file written: {}", self.path);
        Ok(())
    }
}

fn variant_columns(v: &VariantSummary, with_breakeven: bool) -> Vec<String> {
    let mut cols = vec![
        enum_text(&v.phase),
        v.max_favorable_r.to_string(),
        v.max_adverse_r.to_string(),
        v.completed_reason.as_ref().map(enum_text).unwrap_or_default(),
        v.completed_at.map_or(String::new(), |t| t.to_rfc3339()),
    ];
    if with_breakeven {
        cols.push(v.stop_at_entry.to_string());
    }
    cols
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map_or(String::new(), |v| v.to_string())
}

// serde names, so CSV matches the JSON API
fn enum_text<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}
