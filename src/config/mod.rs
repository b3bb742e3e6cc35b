//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::view::DEFAULT_PAGE_SIZE;

/// Which document store backs the live queries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// Supabase project (PostgREST)
    Supabase {
        url: String,
        /// Service role key (bypasses RLS - server only!)
        service_role_key: String,
    },
    /// In-process store, optionally seeded from a JSON file
    Memory { seed_file: Option<PathBuf> },
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub store: StoreBackend,
    /// Supabase JWT secret for token verification
    pub supabase_jwt_secret: String,

    /// Stores listed per page when the client does not ask for a size
    pub page_size: usize,
    /// Largest page a client may ask for
    pub max_page_size: usize,
    /// How often a live query re-reads the remote store
    pub live_poll_interval: Duration,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let store = match lookup("STORE_BACKEND").as_deref() {
            Some("supabase") => supabase_backend(&lookup)?,
            Some("memory") => StoreBackend::Memory {
                seed_file: lookup("SEED_FILE").map(PathBuf::from),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                })
            }
            None if lookup("SUPABASE_URL").is_some() => supabase_backend(&lookup)?,
            None => StoreBackend::Memory {
                seed_file: lookup("SEED_FILE").map(PathBuf::from),
            },
        };

        let page_size: usize = parse_or(&lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "PAGE_SIZE",
                value: page_size.to_string(),
            });
        }

        let max_page_size: usize = parse_or(&lookup, "MAX_PAGE_SIZE", 50)?;
        if max_page_size < page_size {
            return Err(ConfigError::Invalid {
                key: "MAX_PAGE_SIZE",
                value: max_page_size.to_string(),
            });
        }

        let poll_ms: u64 = parse_or(&lookup, "LIVE_POLL_INTERVAL_MS", 1000)?;
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "LIVE_POLL_INTERVAL_MS",
                value: poll_ms.to_string(),
            });
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            store,
            supabase_jwt_secret: lookup("SUPABASE_JWT_SECRET")
                .ok_or(ConfigError::Missing("SUPABASE_JWT_SECRET"))?,

            page_size,
            max_page_size,
            live_poll_interval: Duration::from_millis(poll_ms),

            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_default(),
        })
    }
}

fn supabase_backend(lookup: &impl Fn(&str) -> Option<String>) -> Result<StoreBackend, ConfigError> {
    Ok(StoreBackend::Supabase {
        url: lookup("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
        service_role_key: lookup("SUPABASE_SERVICE_ROLE_KEY")
            .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?,
    })
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_memory_backend() {
        let config = assert_ok!(load(&[("SUPABASE_JWT_SECRET", "s")]));
        assert_eq!(config.store, StoreBackend::Memory { seed_file: None });
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.live_poll_interval, Duration::from_secs(1));
        assert_eq!(config.server_addr.port(), 8080);
    }

    #[test]
    fn supabase_url_selects_supabase() {
        let config = assert_ok!(load(&[
            ("SUPABASE_JWT_SECRET", "s"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "k"),
            ("PORT", "9000"),
        ]));
        assert!(matches!(config.store, StoreBackend::Supabase { .. }));
        assert_eq!(config.server_addr.port(), 9000);

        let missing_key = load(&[
            ("SUPABASE_JWT_SECRET", "s"),
            ("SUPABASE_URL", "https://x.supabase.co"),
        ]);
        assert!(matches!(
            missing_key,
            Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert_err!(load(&[]));
        assert_err!(load(&[("SUPABASE_JWT_SECRET", "s"), ("PAGE_SIZE", "0")]));
        assert_err!(load(&[("SUPABASE_JWT_SECRET", "s"), ("PAGE_SIZE", "four")]));
        assert_err!(load(&[
            ("SUPABASE_JWT_SECRET", "s"),
            ("PAGE_SIZE", "20"),
            ("MAX_PAGE_SIZE", "10")
        ]));
        assert_err!(load(&[
            ("SUPABASE_JWT_SECRET", "s"),
            ("LIVE_POLL_INTERVAL_MS", "0")
        ]));
        assert_err!(load(&[("SUPABASE_JWT_SECRET", "s"), ("STORE_BACKEND", "redis")]));
    }
}
