//! Configuration file support for Shelf.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/shelf/config.toml`.

use crate::{Error, FinePolicy, Result, GRACE_DAYS, RATE_PER_DAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Longest grace period accepted from a config file (ten years)
pub const MAX_GRACE_DAYS: u32 = 3650;

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub loans: LoanConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Loan period and late fine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoanConfig {
    #[serde(default = "default_grace_days")]
    pub grace_days: u32,

    #[serde(default = "default_rate_per_day")]
    pub rate_per_day: u64,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            grace_days: default_grace_days(),
            rate_per_day: default_rate_per_day(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("shelf")
}

fn default_grace_days() -> u32 {
    GRACE_DAYS
}

fn default_rate_per_day() -> u64 {
    RATE_PER_DAY
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject loan settings the ledger cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.loans.grace_days > MAX_GRACE_DAYS {
            return Err(Error::Config(format!(
                "grace_days must be at most {}, got {}",
                MAX_GRACE_DAYS, self.loans.grace_days
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("shelf").join("config.toml")
    }

    /// Grace period and rate the ledger charges with
    pub fn fine_policy(&self) -> FinePolicy {
        FinePolicy {
            grace_days: self.loans.grace_days,
            rate_per_day: self.loans.rate_per_day,
        }
    }
}
