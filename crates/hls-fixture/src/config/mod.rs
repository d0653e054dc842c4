//! Server configuration.

mod rules_file;

pub use rules_file::{FailEntry, RedirectEntry, RulesFile, SucceedEntry};

use std::path::PathBuf;
use std::time::Duration;

/// Fixture server configuration.
#[derive(Debug, Clone)]
pub struct FixtureServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port, `0` for an OS-assigned one
    pub port: u16,
    /// Directory whose files are served
    pub base_dir: PathBuf,
    /// How long `stop` waits for in-flight responses
    pub shutdown_timeout: Duration,
}

impl Default for FixtureServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            base_dir: PathBuf::from("files"),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl FixtureServerConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `FIXTURE_BIND_ADDRESS` (e.g. "127.0.0.1")
    /// - `FIXTURE_PORT` (e.g. "3000")
    /// - `FIXTURE_BASE_DIR` (e.g. "tests/files")
    /// - `FIXTURE_SHUTDOWN_TIMEOUT_SECS` (e.g. "5")
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(bind_address) = lookup("FIXTURE_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Some(port) = lookup("FIXTURE_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Some(base_dir) = lookup("FIXTURE_BASE_DIR")
            && !base_dir.trim().is_empty()
        {
            config.base_dir = PathBuf::from(base_dir);
        }

        if let Some(secs) = lookup("FIXTURE_SHUTDOWN_TIMEOUT_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
        {
            config.shutdown_timeout = Duration::from_secs(parsed);
        }

        config
    }
}
