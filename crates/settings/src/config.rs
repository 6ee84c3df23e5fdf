//! Configuration types

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use piclaim_core::{
    Address, DEFAULT_EXPLORER_TX_URL, DEFAULT_HORIZON_URL, PI_NETWORK_PASSPHRASE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::keys::*;
use crate::{Result, SettingsError};

/// Complete process configuration
#[derive(Clone)]
pub struct Settings {
    /// Recovery phrase of the account that owns the balances
    pub claimant_phrase: String,

    /// Recovery phrase of the account that pays fees
    pub sponsor_phrase: String,

    /// Where claimed funds are sent
    pub destination: Address,

    pub horizon_url: String,
    pub network_passphrase: String,
    pub explorer_tx_url: String,
    pub telegram: TelegramSettings,
    pub policy: PolicySettings,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("claimant_phrase", &"<redacted>")
            .field("sponsor_phrase", &"<redacted>")
            .field("destination", &self.destination)
            .field("horizon_url", &self.horizon_url)
            .field("network_passphrase", &self.network_passphrase)
            .field("explorer_tx_url", &self.explorer_tx_url)
            .field("telegram", &self.telegram)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// Keys missing there are taken from a dotenv file: the one named by
    /// `PICLAIM_ENV_FILE`, or else the nearest `.env` in the working
    /// directory or its parents.
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var(ENV_FILE) {
            Ok(path) if !path.trim().is_empty() => read_env_file(Path::new(path.trim()))?,
            _ => find_env_file()?,
        };
        Self::from_lookup_with_file(|key| std::env::var(key).ok(), &file)
    }

    /// Read settings through `lookup`, falling back to `file` for keys it
    /// does not set.
    pub fn from_lookup_with_file<F>(lookup: F, file: &HashMap<String, String>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|key| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file.get(key).cloned())
        })
    }

    /// Read settings through `lookup`. Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str, alias: &'static str| {
            get(key).or_else(|| get(alias)).ok_or(SettingsError::Missing(key))
        };

        let claimant_phrase = required(CLAIMANT_PHRASE, CLAIMANT_PHRASE_ALIAS)?;
        let sponsor_phrase = required(SPONSOR_PHRASE, SPONSOR_PHRASE_ALIAS)?;
        let destination: Address = required(DESTINATION_ADDRESS, DESTINATION_ADDRESS_ALIAS)?
            .parse()
            .map_err(|e: piclaim_core::CoreError| SettingsError::Invalid {
                key: DESTINATION_ADDRESS,
                reason: e.to_string(),
            })?;

        let mut policy = match get(SETTINGS_FILE) {
            Some(path) => PolicySettings::load_from(Path::new(&path))?,
            None => PolicySettings::default(),
        };
        policy.apply_overrides(&get)?;

        Ok(Self {
            claimant_phrase,
            sponsor_phrase,
            destination,
            horizon_url: get(HORIZON_URL)
                .unwrap_or_else(|| DEFAULT_HORIZON_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            network_passphrase: get(NETWORK_PASSPHRASE)
                .unwrap_or_else(|| PI_NETWORK_PASSPHRASE.to_string()),
            explorer_tx_url: get(EXPLORER_TX_URL)
                .unwrap_or_else(|| DEFAULT_EXPLORER_TX_URL.to_string()),
            telegram: TelegramSettings {
                bot_token: get(TELEGRAM_BOT_TOKEN),
                chat_id: get(TELEGRAM_CHAT_ID),
                api_url: get(TELEGRAM_API_URL),
            },
            policy,
        })
    }
}

/// Telegram delivery credentials; both must be set to enable notifications
#[derive(Clone, Default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// API base URL override
    pub api_url: Option<String>,
}

impl TelegramSettings {
    pub fn is_enabled(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Tunables of the claim loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Delay between cycles in milliseconds
    #[serde(default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,

    #[serde(default)]
    pub schedule: ScheduleMode,

    /// Upper bound for backoff delays in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Fee bid as a multiple of the base fee
    #[serde(default = "default_fee_multiplier")]
    pub fee_multiplier: u32,

    /// Balances fetched per scan
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Validity window of built transactions
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// At most one rate-limit alert per window
    #[serde(default = "default_rate_limit_alert_window_secs")]
    pub rate_limit_alert_window_secs: u64,
}

/// Parse a dotenv file into key/value pairs without touching the process
/// environment.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let vars = dotenvy::from_path_iter(path)
        .and_then(|entries| entries.collect::<std::result::Result<HashMap<_, _>, _>>())
        .map_err(SettingsError::EnvFile)?;
    info!("Loaded {} value(s) from {:?}", vars.len(), path);
    Ok(vars)
}

fn find_env_file() -> Result<HashMap<String, String>> {
    match dotenvy::dotenv_iter() {
        Ok(entries) => entries
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .map_err(SettingsError::EnvFile),
        Err(e) if e.not_found() => {
            debug!("No .env file found, using the process environment only");
            Ok(HashMap::new())
        }
        Err(e) => Err(SettingsError::EnvFile(e)),
    }
}

fn default_cycle_delay_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_fee_multiplier() -> u32 {
    2
}

fn default_page_size() -> u32 {
    10
}

fn default_tx_timeout_secs() -> u64 {
    60
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_alert_window_secs() -> u64 {
    300
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            cycle_delay_ms: default_cycle_delay_ms(),
            schedule: ScheduleMode::default(),
            backoff_max_ms: default_backoff_max_ms(),
            fee_multiplier: default_fee_multiplier(),
            page_size: default_page_size(),
            tx_timeout_secs: default_tx_timeout_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            rate_limit_alert_window_secs: default_rate_limit_alert_window_secs(),
        }
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e: T::Err| SettingsError::Invalid {
        key,
        reason: format!("{:?}: {}", value, e),
    })
}

impl PolicySettings {
    /// Load a JSON policy file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
        let policy: PolicySettings = serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
        info!("Loaded policy settings from {:?}", path);
        Ok(policy)
    }

    fn apply_overrides(&mut self, get: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get(CYCLE_DELAY_MS) {
            self.cycle_delay_ms = parse(CYCLE_DELAY_MS, &v)?;
        }
        if let Some(v) = get(SCHEDULE) {
            self.schedule = parse(SCHEDULE, &v)?;
        }
        if let Some(v) = get(BACKOFF_MAX_MS) {
            self.backoff_max_ms = parse(BACKOFF_MAX_MS, &v)?;
        }
        if let Some(v) = get(FEE_MULTIPLIER) {
            self.fee_multiplier = parse(FEE_MULTIPLIER, &v)?;
        }
        if let Some(v) = get(PAGE_SIZE) {
            self.page_size = parse(PAGE_SIZE, &v)?;
        }
        if let Some(v) = get(TX_TIMEOUT_SECS) {
            self.tx_timeout_secs = parse(TX_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(HTTP_TIMEOUT_SECS) {
            self.http_timeout_secs = parse(HTTP_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(RATE_LIMIT_ALERT_WINDOW_SECS) {
            self.rate_limit_alert_window_secs = parse(RATE_LIMIT_ALERT_WINDOW_SECS, &v)?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        let invalid = |key, reason: &str| {
            Err(SettingsError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };
        if self.fee_multiplier == 0 {
            return invalid(FEE_MULTIPLIER, "must be at least 1");
        }
        if self.page_size == 0 || self.page_size > 200 {
            return invalid(PAGE_SIZE, "must be between 1 and 200");
        }
        if self.tx_timeout_secs == 0 {
            return invalid(TX_TIMEOUT_SECS, "must be at least 1");
        }
        if self.http_timeout_secs == 0 {
            return invalid(HTTP_TIMEOUT_SECS, "must be at least 1");
        }
        Ok(())
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rate_limit_alert_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_alert_window_secs)
    }
}

/// How the next cycle is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// No delay between cycles
    Immediate,
    /// Constant delay between cycles
    #[default]
    Fixed,
    /// Constant delay, doubled after each failed cycle up to a cap
    Backoff,
}

impl FromStr for ScheduleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "fixed" => Ok(Self::Fixed),
            "backoff" => Ok(Self::Backoff),
            other => Err(format!("unknown schedule {:?} (expected immediate, fixed or backoff)", other)),
        }
    }
}
