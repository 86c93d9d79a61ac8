//! Environment configuration for the `PostgreSQL` backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use strata_core::repository::DEFAULT_PAGE_SIZE;
use thiserror::Error;

use crate::pg_repository::PgRepository;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Configuration errors, each naming the offending variable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// A variable is set but cannot be used.
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What the value should look like.
        expected: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Connection and reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `DATABASE_URL`: `PostgreSQL` connection string.
    pub database_url: String,
    /// `STRATA_MAX_CONNECTIONS`: pool size.
    pub max_connections: u32,
    /// `STRATA_PAGE_SIZE`: events fetched per reader page.
    pub page_size: u64,
}

impl StoreConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is missing or a numeric
    /// variable does not parse as a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// As [`StoreConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = parse_positive(
            &lookup,
            "STRATA_MAX_CONNECTIONS",
            u64::from(DEFAULT_MAX_CONNECTIONS),
        )?;
        let max_connections =
            u32::try_from(max_connections).map_err(|_| ConfigError::Invalid {
                name: "STRATA_MAX_CONNECTIONS",
                expected: "a positive 32-bit integer",
                value: max_connections.to_string(),
            })?;
        let page_size = parse_positive(&lookup, "STRATA_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;

        Ok(Self {
            database_url,
            max_connections,
            page_size,
        })
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns the `sqlx::Error` if the database cannot be reached.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
    }

    /// A repository over `pool` using this configuration's page size.
    #[must_use]
    pub fn repository(&self, pool: PgPool) -> PgRepository {
        PgRepository::new(pool).with_page_size(self.page_size)
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: raw,
        }),
    }
}
