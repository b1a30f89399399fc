//! # Ledger Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     GARAGE_DB_PATH=/srv/garage/ledger.db                                │
//! │     GARAGE_INVOICE_PREFIX=GAC                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/ledger/garage-ledger.toml (Linux)                         │
//! │     ~/Library/Application Support/com.garage.ledger/ (macOS)            │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/garage/ledger.db"
//! max_connections = 5
//! busy_timeout_secs = 10
//!
//! [numbering]
//! invoice_prefix = "GAC"
//! payment_prefix = "RCPT"
//! advance_prefix = "ADV"
//!
//! [ledger]
//! payment_tolerance_paise = 1
//! reconcile_tolerance_paise = 5
//! ```

use garage_core::numbering::normalize_prefix;
use garage_core::Money;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

/// Config file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "garage-ledger.toml";

/// Database file name inside the platform data directory.
pub const DATABASE_FILE_NAME: &str = "garage-ledger.db";

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the lock held by another writer.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "garage", "ledger")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.path.clone())
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
    }
}

// =============================================================================
// Numbering Settings
// =============================================================================

/// Fallback prefixes used when a branch carries none.
///
/// Empty or unset values fall back to the document kind's default
/// (`INV`, `RCPT`, `ADV`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingSettings {
    #[serde(default)]
    pub invoice_prefix: Option<String>,
    #[serde(default)]
    pub payment_prefix: Option<String>,
    #[serde(default)]
    pub advance_prefix: Option<String>,
}

// =============================================================================
// Ledger Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Slack when comparing a payment with the outstanding balance.
    #[serde(default = "default_payment_tolerance")]
    pub payment_tolerance_paise: i64,

    /// Slack when reconciling header totals against line totals.
    #[serde(default = "default_reconcile_tolerance")]
    pub reconcile_tolerance_paise: i64,
}

fn default_payment_tolerance() -> i64 {
    garage_core::ledger::PAYMENT_TOLERANCE.paise()
}

fn default_reconcile_tolerance() -> i64 {
    garage_core::RECONCILE_TOLERANCE.paise()
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            payment_tolerance_paise: default_payment_tolerance(),
            reconcile_tolerance_paise: default_reconcile_tolerance(),
        }
    }
}

impl LedgerSettings {
    pub fn payment_tolerance(&self) -> Money {
        Money::from_paise(self.payment_tolerance_paise)
    }

    pub fn reconcile_tolerance(&self) -> Money {
        Money::from_paise(self.reconcile_tolerance_paise)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`garage-ledger.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(DbError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if !(0..=100).contains(&self.ledger.payment_tolerance_paise) {
            return Err(DbError::Config(
                "ledger.payment_tolerance_paise must be between 0 and 100".into(),
            ));
        }

        if !(0..=100).contains(&self.ledger.reconcile_tolerance_paise) {
            return Err(DbError::Config(
                "ledger.reconcile_tolerance_paise must be between 0 and 100".into(),
            ));
        }

        for (field, prefix) in [
            ("numbering.invoice_prefix", &self.numbering.invoice_prefix),
            ("numbering.payment_prefix", &self.numbering.payment_prefix),
            ("numbering.advance_prefix", &self.numbering.advance_prefix),
        ] {
            if let Some(raw) = prefix {
                if !raw.trim().is_empty() && normalize_prefix(raw).is_empty() {
                    return Err(DbError::Config(format!(
                        "{field} '{raw}' has no usable characters (A-Z, 0-9, '-')"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("GARAGE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("GARAGE_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid GARAGE_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(secs) = std::env::var("GARAGE_DB_BUSY_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(n) => self.database.busy_timeout_secs = n,
                Err(_) => warn!(value = %secs, "Ignoring invalid GARAGE_DB_BUSY_TIMEOUT_SECS"),
            }
        }

        if let Ok(prefix) = std::env::var("GARAGE_INVOICE_PREFIX") {
            self.numbering.invoice_prefix = Some(prefix);
        }
        if let Ok(prefix) = std::env::var("GARAGE_PAYMENT_PREFIX") {
            self.numbering.payment_prefix = Some(prefix);
        }
        if let Ok(prefix) = std::env::var("GARAGE_ADVANCE_PREFIX") {
            self.numbering.advance_prefix = Some(prefix);
        }

        if let Ok(paise) = std::env::var("GARAGE_PAYMENT_TOLERANCE_PAISE") {
            if let Ok(p) = paise.parse::<i64>() {
                self.ledger.payment_tolerance_paise = p;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "garage", "ledger")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.ledger.payment_tolerance(), Money::from_paise(1));
        assert_eq!(config.ledger.reconcile_tolerance(), Money::from_paise(5));
        assert!(config.numbering.invoice_prefix.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: LedgerConfig = toml::from_str(
            r#"
            [numbering]
            invoice_prefix = "gac"
            "#,
        )
        .unwrap();
        assert_eq!(config.numbering.invoice_prefix.as_deref(), Some("gac"));
        assert_eq!(config.database.busy_timeout_secs, 10);
        assert_eq!(config.ledger.reconcile_tolerance_paise, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = LedgerConfig::default();

        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        config.database.max_connections = 2;
        config.numbering.invoice_prefix = Some("///".into());
        assert!(config.validate().is_err());

        config.numbering.invoice_prefix = Some("gac-blr".into());
        assert!(config.validate().is_ok());

        config.ledger.payment_tolerance_paise = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[database]\npath = \"/tmp/ledger-test.db\"\nmax_connections = 3\n",
        )
        .unwrap();

        let config = LedgerConfig::load(Some(path)).unwrap();
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.database.db_config().max_connections, 3);
    }

    #[test]
    fn test_bad_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[database\n").unwrap();

        let err = LedgerConfig::load(Some(path)).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_toml_serialization() {
        let config = LedgerConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[ledger]"));
    }
}
