use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use loya_rewards::{
    OutcomeTable, RateLimitPolicy, CONTACT_RATE_LIMIT, CONTACT_RATE_WINDOW_MS, DEFAULT_RATE_LIMIT,
    DEFAULT_RATE_WINDOW_MS,
};

const DEFAULT_DATA_DIR: &str = ".loya";

/// Settings read from `--config <file.json>`. Every field is optional.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Wheel segments, clockwise.
    pub rewards: OutcomeTable,
    /// Directory holding `claims.json`, `ledger.json` and `limits.json`.
    pub data_dir: PathBuf,
    pub contact_limit: i64,
    pub contact_window_ms: i64,
    pub login_limit: i64,
    pub login_window_ms: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rewards: OutcomeTable::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            contact_limit: CONTACT_RATE_LIMIT,
            contact_window_ms: CONTACT_RATE_WINDOW_MS,
            login_limit: DEFAULT_RATE_LIMIT,
            login_window_ms: DEFAULT_RATE_WINDOW_MS,
        }
    }
}

impl Config {
    /// Load `path` if given, otherwise defaults. Rate-limit values are
    /// validated up front so a bad file fails at startup, not on first submit.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let config: Config = match path {
            Some(path) => {
                let body = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
                serde_json::from_str(&body)
                    .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))?
            }
            None => Config::default(),
        };
        RateLimitPolicy::new(config.contact_limit, config.contact_window_ms)
            .map_err(|e| format!("contact limit: {e}"))?;
        RateLimitPolicy::new(config.login_limit, config.login_window_ms)
            .map_err(|e| format!("login limit: {e}"))?;
        Ok(config)
    }

    pub fn claims_path(&self) -> PathBuf {
        self.data_dir.join("claims.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }

    /// Rate-limit windows, shared by every `loya-tui` process on this data dir.
    pub fn limits_path(&self) -> PathBuf {
        self.data_dir.join("limits.json")
    }
}
