//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use casino_wallet::{db::DatabaseConfig, wallet::SeedOptions};
use rust_decimal::Decimal;
use std::{net::SocketAddr, str::FromStr};

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Which store backs the wallet
    pub backend: StoreBackend,
    /// Sample players created on an empty store, if any
    pub seed: Option<SeedOptions>,
    /// Default log filter directive
    pub log_level: String,
    /// Prometheus exporter address; metrics are off when unset
    pub metrics_bind: Option<SocketAddr>,
}

/// Store implementation selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Values given on the command line, which win over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<SocketAddr>,
    pub database_url: Option<String>,
    pub backend: Option<StoreBackend>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `overrides` - Values from CLI args
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but malformed
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok(), overrides)
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F, overrides: CliOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        // Bind address
        let bind = match overrides.bind {
            Some(bind) => bind,
            None => match env.get("SERVER_BIND") {
                Some(raw) => parse_addr("SERVER_BIND", &raw)?,
                None => {
                    let port = env.parse_or("APPLICATION_PORT", 8080u16);
                    SocketAddr::from(([0, 0, 0, 0], port))
                }
            },
        };

        // Database configuration
        let database_url = overrides
            .database_url
            .or_else(|| env.get("DATABASE_URL"))
            .unwrap_or_else(|| {
                DatabaseConfig::url_from_parts(
                    &env.get_or("POSTGRES_HOST", "localhost"),
                    env.parse_or("POSTGRES_PORT", 5432),
                    &env.get_or("POSTGRES_USER", "postgres"),
                    &env.get_or("POSTGRES_PASSWORD", "postgres"),
                    &env.get_or("POSTGRES_DB", "casino_wallet"),
                )
            });

        let database = DatabaseConfig {
            database_url,
            max_connections: env.parse_or("DB_MAX_CONNECTIONS", 20),
            min_connections: env.parse_or("DB_MIN_CONNECTIONS", 2),
            connection_timeout_secs: env.parse_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: env.parse_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env.parse_or("DB_MAX_LIFETIME_SECS", 1800),
            query_timeout_ms: env.parse_or("DB_QUERY_TIMEOUT_MS", 5000),
            lock_timeout_ms: env.parse_or("DB_LOCK_TIMEOUT_MS", 3000),
            connect_retries: env.parse_or("DB_CONNECT_RETRIES", 5),
            connect_retry_delay_secs: env.parse_or("DB_CONNECT_RETRY_DELAY_SECS", 5),
        };

        let backend = match overrides.backend {
            Some(backend) => backend,
            None => match env.get("STORE_BACKEND") {
                Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                    var: "STORE_BACKEND".to_string(),
                    reason,
                })?,
                None => StoreBackend::Postgres,
            },
        };

        // Seeding
        let seed = if env.parse_or("SEED_PLAYERS", true) {
            let balance = match env.get("SEED_BALANCE") {
                Some(raw) => Decimal::from_str(raw.trim()).map_err(|e| ConfigError::Invalid {
                    var: "SEED_BALANCE".to_string(),
                    reason: e.to_string(),
                })?,
                None => Decimal::from(100_000),
            };
            Some(SeedOptions {
                count: env.parse_or("SEED_PLAYER_COUNT", 30),
                balance,
                currency: env.get_or("SEED_CURRENCY", "INR"),
            })
        } else {
            None
        };

        // Logging
        let log_level = if env.parse_or("DEBUG", false) {
            "debug".to_string()
        } else {
            env.get_or("LOG_LEVEL", "info").to_lowercase()
        };

        let metrics_bind = env
            .get("METRICS_BIND")
            .map(|raw| parse_addr("METRICS_BIND", &raw))
            .transpose()?;

        Ok(ServerConfig {
            bind,
            database,
            backend,
            seed,
            log_level,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate pool sizing
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        // Validate timeouts
        for (var, value) in [
            ("DB_CONNECTION_TIMEOUT_SECS", self.database.connection_timeout_secs),
            ("DB_QUERY_TIMEOUT_MS", self.database.query_timeout_ms),
            ("DB_LOCK_TIMEOUT_MS", self.database.lock_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        // Validate seeding
        if let Some(seed) = &self.seed {
            if seed.count == 0 {
                return Err(ConfigError::Invalid {
                    var: "SEED_PLAYER_COUNT".to_string(),
                    reason: "Must be greater than 0 when seeding is enabled".to_string(),
                });
            }

            if seed.balance.is_sign_negative() {
                return Err(ConfigError::Invalid {
                    var: "SEED_BALANCE".to_string(),
                    reason: "Must not be negative".to_string(),
                });
            }

            if seed.currency.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    var: "SEED_CURRENCY".to_string(),
                    reason: "Must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Key lookup with typed fallbacks
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Helper to parse a variable with default fallback
    fn parse_or<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr,
    {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

fn parse_addr(var: &str, raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var: var.to_string(),
        reason: format!("'{raw}' is not a socket address"),
    })
}
