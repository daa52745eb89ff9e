//! # Engine Configuration
//!
//! Configuration management for the catering engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     CATERING_PORTAL_BASE_URL=https://portal.example.com                 │
//! │     CATERING_TAX_SERVICE_BPS=700                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/catering-engine/catering.toml (Linux)                     │
//! │     ~/Library/Application Support/com.catering.engine/catering.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! │     2% + 7% tax, 90-day tokens, 14/60-day schedule thresholds           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # catering.toml
//! [portal]
//! base_url = "https://portal.example.com"
//! token_ttl_days = 90
//!
//! [tax]
//! hospitality_bps = 200   # 2.00%
//! service_bps = 700       # 7.00%
//!
//! [schedule]
//! near_term_days = 14
//! long_lead_days = 60
//!
//! [database]
//! path = "catering.db"
//! max_connections = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::token::MAX_TOKEN_TTL_DAYS;
use catering_core::schedule::SchedulePolicy;
use catering_core::tax::{TaxConfig, TaxRate};
use catering_core::validation::validate_tax_rate_bps;
use catering_core::DEFAULT_TOKEN_TTL_DAYS;
use catering_db::DbConfig;

// =============================================================================
// Portal Settings
// =============================================================================

/// Customer portal links and access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSettings {
    /// Origin of the customer portal; links are `{base_url}/estimate?token=...`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_token_ttl_days() -> i64 {
    DEFAULT_TOKEN_TTL_DAYS
}

impl Default for PortalSettings {
    fn default() -> Self {
        PortalSettings {
            base_url: default_base_url(),
            token_ttl_days: default_token_ttl_days(),
        }
    }
}

// =============================================================================
// Tax Settings
// =============================================================================

/// Tax rates in basis points (100 bps = 1%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSettings {
    #[serde(default = "default_hospitality_bps")]
    pub hospitality_bps: u32,

    #[serde(default = "default_service_bps")]
    pub service_bps: u32,
}

fn default_hospitality_bps() -> u32 {
    200
}

fn default_service_bps() -> u32 {
    700
}

impl Default for TaxSettings {
    fn default() -> Self {
        TaxSettings {
            hospitality_bps: default_hospitality_bps(),
            service_bps: default_service_bps(),
        }
    }
}

impl TaxSettings {
    pub fn tax_config(&self) -> TaxConfig {
        TaxConfig {
            hospitality: TaxRate::from_bps(self.hospitality_bps),
            service: TaxRate::from_bps(self.service_bps),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("catering.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub portal: PortalSettings,

    #[serde(default)]
    pub tax: TaxSettings,

    #[serde(default)]
    pub schedule: SchedulePolicy,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl EngineConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Load from TOML file (if exists)
    /// 3. Override with environment variables
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
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

    /// Loads configuration, falling back to defaults on error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load engine config, using defaults");
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        let url = &self.portal.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::InvalidConfig(format!(
                "portal.base_url must start with http:// or https://, got: {}",
                url
            )));
        }

        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&self.portal.token_ttl_days) {
            return Err(EngineError::InvalidConfig(format!(
                "portal.token_ttl_days must be between 1 and {}",
                MAX_TOKEN_TTL_DAYS
            )));
        }

        for bps in [self.tax.hospitality_bps, self.tax.service_bps] {
            validate_tax_rate_bps(bps)
                .map_err(|e| EngineError::InvalidConfig(format!("tax: {}", e)))?;
        }

        let s = &self.schedule;
        if s.near_term_days < 0 || s.near_term_days >= s.long_lead_days {
            return Err(EngineError::InvalidConfig(
                "schedule.near_term_days must be below schedule.long_lead_days".into(),
            ));
        }
        if s.person_deposit_percent >= 100
            || s.company_combined_percent >= 100
            || s.company_deposit_percent + s.company_milestone_percent >= 100
        {
            return Err(EngineError::InvalidConfig(
                "schedule percentages must leave a non-zero balance".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `CATERING_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CATERING_PORTAL_BASE_URL") {
            debug!(url = %url, "Overriding portal URL from environment");
            self.portal.base_url = url;
        }

        if let Some(ttl) = lookup("CATERING_TOKEN_TTL_DAYS") {
            match ttl.parse::<i64>() {
                Ok(days) => self.portal.token_ttl_days = days,
                Err(_) => warn!(value = %ttl, "Ignoring invalid CATERING_TOKEN_TTL_DAYS"),
            }
        }

        if let Some(bps) = lookup("CATERING_TAX_HOSPITALITY_BPS") {
            match bps.parse::<u32>() {
                Ok(v) => self.tax.hospitality_bps = v,
                Err(_) => warn!(value = %bps, "Ignoring invalid CATERING_TAX_HOSPITALITY_BPS"),
            }
        }

        if let Some(bps) = lookup("CATERING_TAX_SERVICE_BPS") {
            match bps.parse::<u32>() {
                Ok(v) => self.tax.service_bps = v,
                Err(_) => warn!(value = %bps, "Ignoring invalid CATERING_TAX_SERVICE_BPS"),
            }
        }

        if let Some(path) = lookup("CATERING_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }
    }

    /// Gets the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "catering", "engine")
            .map(|dirs| dirs.config_dir().join("catering.toml"))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn tax_config(&self) -> TaxConfig {
        self.tax.tax_config()
    }

    pub fn schedule_policy(&self) -> SchedulePolicy {
        self.schedule
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone()).max_connections(self.database.max_connections)
    }
}
