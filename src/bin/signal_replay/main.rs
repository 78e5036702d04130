// main.rs
// Replays an archived webhook log through the normalizer and projector and writes a CSV of trades
mod config;
mod csv_writer;

use chrono::{DateTime, Utc};
use clap::Parser;
use config::{setup_logging, Args, ReplayConfig};
use csv_writer::CsvWriter;
use serde_json::Value;
use signal_tracker::ingest::IngestService;
use signal_tracker::projector::TradeStatus;
use signal_tracker::read_model::{ReadModelService, TradeSummary};
use signal_tracker::store::{EventStore, MemoryEventStore};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ReplayCounts {
    lines: usize,
    unreadable: usize,
    accepted: usize,
    duplicates: usize,
    rejected: usize,
}

/// Splits an archived line into its payload and receive time. Archived lines are
/// either the raw body or `{"received_at": ..., "payload": {...}}`.
fn unwrap_archived(line: Value) -> (Value, DateTime<Utc>) {
    if let Value::Object(obj) = &line {
        if let Some(payload) = obj.get("payload") {
            let received_at = obj
                .get("received_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            return (payload.clone(), received_at);
        }
    }
    (line, Utc::now())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    setup_logging(args.debug);
    let config = ReplayConfig::from_args(args)?;

    let store = Arc::new(MemoryEventStore::new());
    let read_model = Arc::new(ReadModelService::new(
        store.clone(),
        chrono::Duration::minutes(30),
        None,
    ));
    let ingest = IngestService::new(
        store.clone(),
        Arc::clone(&read_model),
        Duration::from_secs(5),
        config.signal_tz,
    );

    info!("Replaying {}", config.input_file);
    let reader = BufReader::new(File::open(&config.input_file)?);
    let mut counts = ReplayCounts::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        counts.lines += 1;
        let parsed: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Line {}: not JSON ({})", line_no + 1, e);
                counts.unreadable += 1;
                continue;
            }
        };
        let (payload, received_at) = unwrap_archived(parsed);
        match ingest.ingest(&payload, received_at).await {
            Ok(report) => {
                counts.accepted += report.accepted;
                counts.duplicates += report.duplicates;
                counts.rejected += report.errors.len();
                for rejection in &report.errors {
                    debug!("Line {} item {}: {}", line_no + 1, rejection.index, rejection.error);
                }
            }
            Err(e) => {
                warn!("Line {}: {}", line_no + 1, e);
                counts.rejected += 1;
            }
        }
    }

    let mut trade_ids: BTreeSet<String> = store.active_trade_ids(DateTime::<Utc>::default()).await?;
    trade_ids.extend(store.terminal_trade_ids().await?);
    let orphaned = store.orphaned_trade_ids().await?;

    let mut summaries: Vec<TradeSummary> = Vec::with_capacity(trade_ids.len());
    for trade_id in &trade_ids {
        if let Some(detail) = read_model.trade_detail(trade_id).await? {
            summaries.push(detail.summary);
        }
    }

    CsvWriter::new(&config.output_file).write_summaries(&summaries)?;

    let active = summaries
        .iter()
        .filter(|s| s.status == TradeStatus::Active)
        .count();
    let completed = summaries
        .iter()
        .filter(|s| s.status == TradeStatus::Completed)
        .count();
    let anomalies: usize = summaries.iter().map(|s| s.anomaly_count).sum();

    info!("Replay summary:");
    info!(
        "   Lines: {} ({} unreadable)",
        counts.lines, counts.unreadable
    );
    info!(
        "   Events: {} stored ({} accepted, {} duplicate), {} rejected",
        store.event_count(),
        counts.accepted,
        counts.duplicates,
        counts.rejected
    );
    info!(
        "   Trades: {} active, {} completed, {} orphaned",
        active,
        completed,
        orphaned.len()
    );
    info!("   Projection anomalies: {}", anomalies);

    Ok(())
}
