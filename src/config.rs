// ⚙️ Configuration - environment driven, with an optional .env file

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "balance_ledger.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "balance_ledger=info,ledger_server=info,tower_http=info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database file (LEDGER_DB_PATH)
    pub database_path: PathBuf,

    /// HTTP listen address (LEDGER_BIND_ADDR)
    pub bind_addr: SocketAddr,

    /// Default tracing filter when RUST_LOG is unset (LEDGER_LOG)
    pub log_filter: String,
}

impl Config {
    /// Load `.env` if present, then read the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map instead of the process env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = lookup("LEDGER_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let bind_raw = lookup("LEDGER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .trim()
            .parse()
            .with_context(|| format!("LEDGER_BIND_ADDR is not a socket address: {:?}", bind_raw))?;

        let log_filter = lookup("LEDGER_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Config {
            database_path: PathBuf::from(database_path),
            bind_addr,
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("LEDGER_DB_PATH", "/tmp/ledger.db"),
            ("LEDGER_BIND_ADDR", "127.0.0.1:8080"),
            ("LEDGER_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/ledger.db"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_bad_bind_addr() {
        let err = Config::from_lookup(lookup_from(&[("LEDGER_BIND_ADDR", "localhost")])).unwrap_err();
        assert!(err.to_string().contains("LEDGER_BIND_ADDR"));
    }
}
