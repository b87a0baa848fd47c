//! Configuration module
//!
//! TOML file, `~/.config/parking-core/config.toml` unless `PARKING_CONFIG`
//! points elsewhere. Every section has defaults, so an empty file is valid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::TransactionOptions;
use crate::domain::{
    IsolationLevel, NewSpot, RateSchedule, RateType, SpotType, TransactionPriority, VehicleType,
};
use crate::infrastructure::DatabaseConfig;
use crate::shared::utills::{Backoff, RetryPolicy};
use crate::shared::validations::validate_features;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "PARKING_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// `~/.config/parking-core/config.toml`, or `./config.toml` when the
/// platform has no config directory.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .map(|dir| dir.join("parking-core").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Path from `PARKING_CONFIG`, falling back to the default location.
pub fn config_path_from_env() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
    pub transactions: TransactionSection,
    pub assignment: AssignmentSection,
    pub garages: Vec<GarageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let defaults = DatabaseConfig::default();
        Self {
            url: defaults.url,
            max_connections: defaults.max_connections,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
        }
    }
}

impl DatabaseSection {
    pub fn connection_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// Transactions the in-memory store lets run at once
    pub max_concurrent_transactions: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            max_concurrent_transactions: crate::infrastructure::storage::DEFAULT_MAX_CONCURRENT_TRANSACTIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Defaults for `TransactionOptions`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSection {
    pub max_wait_ms: u64,
    pub timeout_ms: u64,
    pub isolation: IsolationLevel,
    pub priority: TransactionPriority,
    pub enable_retry: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff: Backoff,
    pub backoff_multiplier: f64,
    pub max_retry_delay_ms: u64,
    pub jitter: bool,
}

impl Default for TransactionSection {
    fn default() -> Self {
        let options = TransactionOptions::default();
        Self {
            max_wait_ms: options.max_wait.as_millis() as u64,
            timeout_ms: options.timeout.as_millis() as u64,
            isolation: options.isolation,
            priority: options.priority,
            enable_retry: options.enable_retry,
            max_retries: options.retry.max_retries,
            retry_delay_ms: options.retry.initial_delay.as_millis() as u64,
            backoff: options.retry.backoff,
            backoff_multiplier: options.retry.backoff_multiplier,
            max_retry_delay_ms: options.retry.max_delay.as_millis() as u64,
            jitter: options.retry.jitter,
        }
    }
}

impl From<&TransactionSection> for TransactionOptions {
    fn from(section: &TransactionSection) -> Self {
        Self {
            max_wait: Duration::from_millis(section.max_wait_ms),
            timeout: Duration::from_millis(section.timeout_ms),
            isolation: section.isolation,
            priority: section.priority,
            enable_retry: section.enable_retry,
            retry: RetryPolicy {
                max_retries: section.max_retries,
                initial_delay: Duration::from_millis(section.retry_delay_ms),
                backoff: section.backoff,
                backoff_multiplier: section.backoff_multiplier,
                max_delay: Duration::from_millis(section.max_retry_delay_ms),
                jitter: section.jitter,
            },
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentSection {
    /// Rate type new sessions start on, per vehicle type. Hourly otherwise.
    pub default_rate_types: BTreeMap<VehicleType, RateType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarageConfig {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rate_schedule: Option<RateSchedule>,
    /// Spots provisioned at startup when not already stored
    #[serde(default)]
    pub spots: Vec<SpotConfig>,
}

/// A run of `count` spots numbered from `number` in one bay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotConfig {
    pub floor: i32,
    pub bay: String,
    pub number: i32,
    #[serde(default = "one")]
    pub count: u32,
    #[serde(rename = "type")]
    pub spot_type: SpotType,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
}

fn one() -> u32 {
    1
}

impl SpotConfig {
    pub fn new_spots(&self, garage_id: i32) -> Vec<NewSpot> {
        (0..self.count as i32)
            .map(|offset| {
                let spot = NewSpot::new(
                    garage_id,
                    self.floor,
                    &self.bay,
                    self.number + offset,
                    self.spot_type,
                )
                .with_features(self.features.iter().cloned());
                match self.hourly_rate {
                    Some(rate) => spot.with_hourly_rate(rate),
                    None => spot,
                }
            })
            .collect()
    }
}

impl AppConfig {
    /// Reads the file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::from(&self.transactions)
    }

    /// Rate schedules of every garage that has one, stamped with the
    /// garage id.
    pub fn rate_schedules(&self) -> Vec<RateSchedule> {
        self.garages
            .iter()
            .filter_map(|garage| {
                garage.rate_schedule.clone().map(|mut schedule| {
                    schedule.garage_id = garage.id;
                    schedule
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url is empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be > 0".into()));
        }
        if self.storage.max_concurrent_transactions == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_concurrent_transactions must be > 0".into(),
            ));
        }
        if !matches!(self.logging.format.to_lowercase().as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be pretty or json, got {:?}",
                self.logging.format
            )));
        }

        let tx = &self.transactions;
        if tx.timeout_ms == 0 || tx.max_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "transactions.timeout_ms and max_wait_ms must be > 0".into(),
            ));
        }
        if !tx.backoff_multiplier.is_finite() || tx.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "transactions.backoff_multiplier must be a finite number >= 1".into(),
            ));
        }
        if tx.max_retry_delay_ms < tx.retry_delay_ms {
            return Err(ConfigError::Invalid(
                "transactions.max_retry_delay_ms is below retry_delay_ms".into(),
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for garage in &self.garages {
            if garage.id < 1 {
                return Err(ConfigError::Invalid(format!("garage id {} must be >= 1", garage.id)));
            }
            if !seen.insert(garage.id) {
                return Err(ConfigError::Invalid(format!("garage {} listed twice", garage.id)));
            }
            for spot in &garage.spots {
                if spot.count == 0 || spot.number < 1 || spot.bay.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "garage {}: spot run on floor {} bay {:?} needs a bay, number >= 1 and count >= 1",
                        garage.id, spot.floor, spot.bay
                    )));
                }
                validate_features(&spot.features).map_err(|e| {
                    ConfigError::Invalid(format!("garage {}: {}", garage.id, e))
                })?;
            }
        }
        for schedule in self.rate_schedules() {
            schedule
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[storage]
backend = "database"

[logging]
level = "debug"
format = "json"

[transactions]
max_retries = 5
isolation = "serializable"
priority = "high"

[assignment.default_rate_types]
oversized = "daily"

[[garages]]
id = 1
name = "Central"

[garages.rate_schedule]
currency = "USD"
hourly = { rate = "5.00" }
daily = { rate = "30.00", max_charge = "45.00" }
grace_period = { minutes = 15 }

[[garages.rate_schedule.peak_windows]]
start = "08:00:00"
end = "10:00:00"
multiplier = "1.5"
days = ["Mon", "Tue"]

[[garages.spots]]
floor = 1
bay = "A"
number = 1
count = 4
type = "standard"

[[garages.spots]]
floor = 1
bay = "B"
number = 1
type = "electric"
features = ["ev_charging"]
hourly_rate = "6.50"

[[garages]]
id = 2
name = "Annex"
"#;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.transactions.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_sample() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Database);
        assert_eq!(config.logging.format, "json");
        assert_eq!(
            config.assignment.default_rate_types.get(&VehicleType::Oversized),
            Some(&RateType::Daily)
        );

        let options = config.transaction_options();
        assert_eq!(options.retry.max_retries, 5);
        assert_eq!(options.isolation, IsolationLevel::Serializable);
        assert_eq!(options.priority, TransactionPriority::High);

        let schedules = config.rate_schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].garage_id, 1);
        assert_eq!(schedules[0].peak_windows.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn spot_runs_expand() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let garage = &config.garages[0];
        let standard = garage.spots[0].new_spots(garage.id);
        assert_eq!(standard.len(), 4);
        assert_eq!(standard[3].spot_number, 4);
        let electric = garage.spots[1].new_spots(garage.id);
        assert_eq!(electric[0].features, vec!["ev_charging".to_string()]);
        assert!(electric[0].hourly_rate_override.is_some());
    }

    #[test]
    fn rejects_duplicate_garages() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.garages[1].id = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_schedule() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        if let Some(schedule) = config.garages[0].rate_schedule.as_mut() {
            schedule.currency = "dollars".into();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_backoff_multiplier() {
        let config = AppConfig::from_toml("[transactions]\nbackoff_multiplier = nan\n").unwrap();
        assert!(config.transactions.backoff_multiplier.is_nan());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = AppConfig::from_toml("[transactions]\nbackoff_multiplier = inf\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut config = AppConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_default() {
        let path = std::env::temp_dir().join("parking-core-missing").join("config.toml");
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.garages.len(), 0);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("parking-core-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let mut config = AppConfig::default();
        config.logging.level = "warn".into();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.logging.level, "warn");
        let _ = std::fs::remove_dir_all(dir);
    }
}
