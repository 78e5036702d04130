// config.rs
use chrono_tz::Tz;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "signal-replay")]
#[command(about = "Rebuild trade projections from an archived webhook log")]
pub struct Args {
    /// JSON-lines file, one webhook body per line (optionally wrapped as {"received_at", "payload"})
    #[arg(short, long)]
    pub input: String,

    /// Output CSV file path
    #[arg(short, long, default_value = "replayed_trades.csv")]
    pub output: String,

    /// IANA zone the indicator encodes trade_id times in
    #[arg(short, long, default_value = "America/New_York")]
    pub timezone: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Debug)]
pub struct ReplayConfig {
    pub input_file: String,
    pub output_file: String,
    pub signal_tz: Tz,
}

impl ReplayConfig {
    pub fn from_args(args: Args) -> Result<Self, String> {
        let signal_tz = args
            .timezone
            .parse::<Tz>()
            .map_err(|_| format!("unknown time zone '{}'", args.timezone))?;
        Ok(Self {
            input_file: args.input,
            output_file: args.output,
            signal_tz,
        })
    }
}

pub fn setup_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}
