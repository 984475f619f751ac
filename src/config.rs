use crate::error::{AppError, Result};

/// Hours a dispute stays open for voting before `handle_expired` applies.
pub const DISPUTE_EXPIRY_HOURS: i64 = 48;

/// Channel capacity for core events headed to the audit writer.
pub const CHANNEL_CAPACITY: usize = 1024;

/// How often the sweeper looks for expired disputes (seconds).
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;

/// Percentage penalties applied when a dispute resolves.
pub mod penalties {
    /// Reporter of a dismissed dispute that was not a self-report.
    pub const FALSE_REPORT_PCT: u32 = 10;
    /// Settler who self-reported a wrong outcome.
    pub const HONEST_MISTAKE_PCT: u32 = 5;
    /// Accused settler, first confirmed fraud for their platform identity.
    pub const FRAUD_FIRST_PCT: u32 = 25;
    /// Accused settler, any confirmed fraud after the first.
    pub const FRAUD_REPEAT_PCT: u32 = 50;
    /// Settler who settled before the outcome was knowable.
    pub const PREMATURE_PCT: u32 = 25;
}

/// Inactivity decay: `clamp(ceil(balance * RATE_PCT / 100), MIN, MAX)`.
pub mod decay {
    pub const RATE_PCT: i64 = 5;
    pub const MIN: i64 = 50;
    pub const MAX: i64 = 100;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Voting window for new disputes (DISPUTE_EXPIRY_HOURS)
    pub dispute_expiry_hours: i64,
    /// Sweeper period (EXPIRY_SWEEP_INTERVAL_SECS)
    pub expiry_sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "wagers.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            dispute_expiry_hours: std::env::var("DISPUTE_EXPIRY_HOURS")
                .unwrap_or_else(|_| DISPUTE_EXPIRY_HOURS.to_string())
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| {
                    AppError::Config("DISPUTE_EXPIRY_HOURS must be a positive integer".to_string())
                })?,
            expiry_sweep_interval_secs: std::env::var("EXPIRY_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| EXPIRY_SWEEP_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(EXPIRY_SWEEP_INTERVAL_SECS)
                .max(1),
        })
    }
}
