//! TOML rules file applied at startup.
//!
//! ```toml
//! [[succeed]]
//! route = "/file1.txt"
//! response_time_ms = 2000
//!
//! [[succeed]]
//! route = "/file2.txt"
//! response_bits_per_sec = 262144
//! headers = { "X-CDN" = "edgemv" }
//!
//! [[redirect]]
//! route = "/live/v0/3.ts"
//! location = "live/v1/3.ts"
//!
//! [[fail]]
//! route = "/live/v0/4.ts"
//! status_code = 503
//! error_body = "try again"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use crate::error::{FixtureError, Result};
use crate::rules::{FailRules, RedirectRules, SuccessRules};
use crate::server::FixtureServer;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    #[serde(default)]
    pub succeed: Vec<SucceedEntry>,
    #[serde(default)]
    pub redirect: Vec<RedirectEntry>,
    #[serde(default)]
    pub fail: Vec<FailEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SucceedEntry {
    pub route: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub response_time_ms: Option<u64>,
    pub response_bits_per_sec: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectEntry {
    pub route: String,
    pub code: Option<u16>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailEntry {
    pub route: String,
    pub status_code: u16,
    pub status_message: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub error_body: Option<String>,
}

impl RulesFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FixtureError::file_read(path.display().to_string(), e))?;
        Self::from_toml_str(&contents)
            .map_err(|reason| FixtureError::rules_file(path.display().to_string(), reason))
    }

    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    pub fn len(&self) -> usize {
        self.succeed.len() + self.redirect.len() + self.fail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Installs every entry on `server`, stopping at the first invalid one.
    pub fn apply(self, server: &FixtureServer) -> Result<usize> {
        let count = self.len();
        for entry in self.succeed {
            server.request_succeeds(
                &entry.route,
                SuccessRules {
                    headers: entry.headers,
                    response_time_ms: entry.response_time_ms,
                    response_bits_per_sec: entry.response_bits_per_sec,
                },
            )?;
        }
        for entry in self.redirect {
            server.request_redirects(
                &entry.route,
                RedirectRules {
                    code: entry.code,
                    headers: entry.headers,
                    location: entry.location,
                },
            )?;
        }
        for entry in self.fail {
            server.request_fails(
                &entry.route,
                FailRules {
                    status_code: entry.status_code,
                    status_message: entry.status_message,
                    headers: entry.headers,
                    error_body: entry.error_body.map(Bytes::from),
                },
            )?;
        }
        info!(rules = count, "Applied rules file");
        Ok(count)
    }
}
