// src/config.rs
// Environment-driven service configuration

use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub signal_timezone: Tz,
    pub ingest_timeout: Duration,
    pub stale_after: chrono::Duration,
    pub active_lookback: Option<chrono::Duration>,
    pub completed_default_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3010,
            database_url: None,
            db_max_connections: 5,
            signal_timezone: chrono_tz::America::New_York,
            ingest_timeout: Duration::from_millis(3000),
            stale_after: chrono::Duration::minutes(30),
            active_lookback: None,
            completed_default_limit: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SIGNAL_TIMEZONE '{0}' is not an IANA time zone")]
    InvalidTimezone(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unparsable values fall back to
    /// the default except for the time zone.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let signal_timezone = match lookup("SIGNAL_TIMEZONE") {
            Some(raw) => raw
                .trim()
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(raw.clone()))?,
            None => defaults.signal_timezone,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let ingest_ms: u64 = parsed(&lookup, "INGEST_TIMEOUT_MS", 3000);
        let stale_minutes: i64 = parsed(&lookup, "STALE_AFTER_MINUTES", 30);
        let active_lookback = lookup("ACTIVE_LOOKBACK_DAYS").and_then(|raw| {
            match raw.trim().parse::<i64>() {
                Ok(days) if days > 0 => Some(chrono::Duration::days(days)),
                _ => {
                    warn!("Ignoring ACTIVE_LOOKBACK_DAYS='{}'", raw);
                    None
                }
            }
        });

        Ok(Self {
            port: parsed(&lookup, "SIGNAL_TRACKER_PORT", defaults.port),
            database_url,
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections),
            signal_timezone,
            ingest_timeout: Duration::from_millis(ingest_ms.max(1)),
            stale_after: chrono::Duration::minutes(stale_minutes.max(1)),
            active_lookback,
            completed_default_limit: parsed(
                &lookup,
                "COMPLETED_DEFAULT_LIMIT",
                defaults.completed_default_limit,
            )
            .clamp(1, crate::read_model::MAX_COMPLETED_LIMIT),
        })
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("   Port: {}", self.port);
        info!(
            "   Store: {}",
            if self.database_url.is_some() {
                "postgres"
            } else {
                "memory"
            }
        );
        info!("   DB pool size: {}", self.db_max_connections);
        info!("   Signal timezone: {}", self.signal_timezone);
        info!("   Ingest timeout: {:?}", self.ingest_timeout);
        info!("   Stale after: {} min", self.stale_after.num_minutes());
        match self.active_lookback {
            Some(days) => info!("   Active lookback: {} days", days.num_days()),
            None => info!("   Active lookback: all history"),
        }
        info!("   Completed default limit: {}", self.completed_default_limit);
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}='{}', using {}", key, raw, default);
            default
        }),
        None => default,
    }
}
