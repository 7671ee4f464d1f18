use std::time::Duration;

use thiserror::Error;

use crate::application::loan_request::{DEFAULT_CONFLICT_RETRY_LIMIT, EngineSettings};
use crate::domain::approval::RestrictedCategories;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_DEPARTMENTAL_CATEGORIES: &str = "projector,microphone,sound-system";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Application configuration read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Postgres URL. The in-memory stores are used when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub port: u16,
    pub departmental_categories: RestrictedCategories,
    pub conflict_retry_limit: u32,
    /// Pending requests older than this are cancelled by the expiry sweep
    pub pending_expiry: Option<chrono::Duration>,
    pub expiry_sweep_interval: Duration,
    /// JSON file seeding the in-memory catalog
    pub catalog_seed_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            port: DEFAULT_PORT,
            departmental_categories: RestrictedCategories::new(
                DEFAULT_DEPARTMENTAL_CATEGORIES.split(','),
            ),
            conflict_retry_limit: DEFAULT_CONFLICT_RETRY_LIMIT,
            pending_expiry: None,
            expiry_sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            catalog_seed_file: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let pending_expiry = parse_opt::<i64>(&var, "PENDING_EXPIRY_HOURS")?
            .map(|hours| {
                if hours <= 0 {
                    Err(ConfigError::InvalidValue {
                        name: "PENDING_EXPIRY_HOURS",
                        value: hours.to_string(),
                        reason: "must be positive".to_string(),
                    })
                } else {
                    Ok(chrono::Duration::hours(hours))
                }
            })
            .transpose()?;

        let sweep_secs = parse_opt::<u64>(&var, "EXPIRY_SWEEP_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "EXPIRY_SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_opt(&var, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            port: parse_opt(&var, "PORT")?.unwrap_or(defaults.port),
            departmental_categories: var("DEPARTMENTAL_CATEGORIES")
                .map(|raw| RestrictedCategories::new(raw.split(',')))
                .unwrap_or(defaults.departmental_categories),
            conflict_retry_limit: parse_opt(&var, "CONFLICT_RETRY_LIMIT")?
                .unwrap_or(defaults.conflict_retry_limit),
            pending_expiry,
            expiry_sweep_interval: Duration::from_secs(sweep_secs),
            catalog_seed_file: var("CATALOG_SEED_FILE"),
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            conflict_retry_limit: self.conflict_retry_limit,
        }
    }
}

fn parse_opt<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    name,
                    value: value.clone(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}
