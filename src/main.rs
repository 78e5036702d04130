// src/main.rs
// Signal tracker service: webhook ingestion and dual-strategy trade read API

use chrono::Utc;
use signal_tracker::api;
use signal_tracker::config::AppConfig;
use signal_tracker::state::AppState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Console plus daily rotating file output
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", "signal_tracker");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_level(true)
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()?;

    println!("Logging initialized:");
    println!("   Daily logs: logs/signal_tracker.YYYY-MM-DD");
    println!("   Console: enabled");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenv::dotenv() {
        println!("Warning: Could not load .env file: {}", e);
    }

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .init();
    }

    info!("Starting signal tracker at {}", Utc::now());

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    config.log_summary();
    let port = config.port;

    let state = match AppState::initialize(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize event store: {}", e);
            std::process::exit(1);
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("Endpoints:");
    info!("   POST   http://localhost:{}/webhook", port);
    info!("   GET    http://localhost:{}/active-trades", port);
    info!("   GET    http://localhost:{}/completed-trades?limit=N", port);
    info!("   GET    http://localhost:{}/trade/:trade_id", port);
    info!("   GET    http://localhost:{}/orphaned-trades", port);
    info!("   GET    http://localhost:{}/leaderboard?variant=BE1&limit=N", port);
    info!("   DELETE http://localhost:{}/trades", port);
    info!("   GET    http://localhost:{}/health", port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
