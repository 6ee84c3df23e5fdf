//! PiClaim Settings
//!
//! Process configuration, read from environment-style key/value pairs.
//!
//! ## Sources
//!
//! - An optional JSON policy file named by `PICLAIM_SETTINGS` (delays, fee
//!   multiplier, timeouts). Every field has a default.
//! - Environment variables, which override the file.
//! - A dotenv file (`PICLAIM_ENV_FILE`, or the nearest `.env`), consulted
//!   only for keys the environment leaves unset.
//!
//! The claimant phrase, sponsor phrase and destination address are required;
//! a missing one is fatal before any cycle runs.
//!
//! ## Usage
//!
//! ```no_run
//! use piclaim_settings::Settings;
//!
//! let settings = Settings::from_env()?;
//! println!("claiming to {}", settings.destination);
//! # Ok::<(), piclaim_settings::SettingsError>(())
//! ```

mod config;

pub use config::{read_env_file, PolicySettings, ScheduleMode, Settings, TelegramSettings};

use thiserror::Error;

/// Environment keys
pub mod keys {
    pub const CLAIMANT_PHRASE: &str = "CLAIMANT_PHRASE";
    pub const SPONSOR_PHRASE: &str = "SPONSOR_PHRASE";
    pub const DESTINATION_ADDRESS: &str = "DESTINATION_ADDRESS";
    pub const HORIZON_URL: &str = "HORIZON_URL";
    pub const NETWORK_PASSPHRASE: &str = "NETWORK_PASSPHRASE";
    pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
    pub const TELEGRAM_API_URL: &str = "TELEGRAM_API_URL";
    pub const EXPLORER_TX_URL: &str = "EXPLORER_TX_URL";
    pub const CYCLE_DELAY_MS: &str = "CYCLE_DELAY_MS";
    pub const SCHEDULE: &str = "SCHEDULE";
    pub const BACKOFF_MAX_MS: &str = "BACKOFF_MAX_MS";
    pub const FEE_MULTIPLIER: &str = "FEE_MULTIPLIER";
    pub const PAGE_SIZE: &str = "PAGE_SIZE";
    pub const TX_TIMEOUT_SECS: &str = "TX_TIMEOUT_SECS";
    pub const HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
    pub const RATE_LIMIT_ALERT_WINDOW_SECS: &str = "RATE_LIMIT_ALERT_WINDOW_SECS";
    pub const SETTINGS_FILE: &str = "PICLAIM_SETTINGS";
    pub const ENV_FILE: &str = "PICLAIM_ENV_FILE";

    /// Legacy names still accepted for the required keys
    pub const CLAIMANT_PHRASE_ALIAS: &str = "MNEMONIC";
    pub const SPONSOR_PHRASE_ALIAS: &str = "SPONSOR_MNEMONIC";
    pub const DESTINATION_ADDRESS_ALIAS: &str = "RECEIVER_ADDRESS";
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Missing required setting {0} (set it in the environment or a .env file)")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to read env file: {0}")]
    EnvFile(dotenvy::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
