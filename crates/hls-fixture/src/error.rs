use std::time::Duration;

/// Result type used throughout the fixture crate.
pub type Result<T> = std::result::Result<T, FixtureError>;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to parse playlist `{path}`: {reason}")]
    Parse { path: String, reason: String },

    #[error("failed to read fixture file `{path}`: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("response write failed: {reason}")]
    Write { reason: String },

    #[error("invalid rule for route `{route}`: {reason}")]
    Configuration { route: String, reason: String },

    #[error("invalid rules file `{path}`: {reason}")]
    RulesFile { path: String, reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("server error: {reason}")]
    Server { reason: String },

    #[error("server shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

impl FixtureError {
    pub fn parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn file_read(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    pub fn write(reason: impl Into<String>) -> Self {
        Self::Write {
            reason: reason.into(),
        }
    }

    pub fn configuration(route: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            route: route.into(),
            reason: reason.into(),
        }
    }

    pub fn rules_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RulesFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn server(reason: impl Into<String>) -> Self {
        Self::Server {
            reason: reason.into(),
        }
    }

    /// Whether the error was raised while configuring the fixture rather than
    /// while serving a request.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::RulesFile { .. } | Self::Parse { .. }
        )
    }
}
