//! Error types for ExpoFinder.
//!
//! Library crates use [`ExpoFinderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ExpoFinder operations.
#[derive(Debug, thiserror::Error)]
pub enum ExpoFinderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A provider needs an API key that is not configured.
    #[error("{provider} API key not configured (set the {env_var} environment variable)")]
    CredentialMissing { provider: String, env_var: String },

    /// Venue website could not be retrieved (network error or non-2xx status).
    #[error("fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Network/HTTP error talking to a third-party API (places, geocoding, LLM).
    #[error("network error: {0}")]
    Network(String),

    /// Response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The language model call failed or returned unusable output.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The city was indexed too recently.
    #[error("City was indexed {hours_since} hours ago. Please wait {wait_hours} more hours.")]
    CooldownActive {
        city: String,
        hours_since: i64,
        wait_hours: i64,
    },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ExpoFinderError>;

impl ExpoFinderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a credential error for `provider`, naming the env var to set.
    pub fn credential_missing(provider: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self::CredentialMissing {
            provider: provider.into(),
            env_var: env_var.into(),
        }
    }

    /// Create a fetch error for `url`.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a not-found error for an entity kind and id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only affects the venue/source being processed.
    ///
    /// Source-scoped errors are logged and the enclosing batch continues.
    /// Everything else (storage, config, credentials) aborts the whole run.
    pub fn is_source_scoped(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. }
                | Self::Network(_)
                | Self::Parse { .. }
                | Self::Extraction(_)
                | Self::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ExpoFinderError::config("missing database path");
        assert_eq!(err.to_string(), "config error: missing database path");

        let err = ExpoFinderError::fetch("https://kmska.be", "HTTP 503 Service Unavailable");
        assert!(err.to_string().contains("kmska.be"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn cooldown_message_names_wait_time() {
        let err = ExpoFinderError::CooldownActive {
            city: "Antwerp".into(),
            hours_since: 10,
            wait_hours: 14,
        };
        assert_eq!(
            err.to_string(),
            "City was indexed 10 hours ago. Please wait 14 more hours."
        );
    }

    #[test]
    fn source_scope_classification() {
        assert!(ExpoFinderError::fetch("u", "timeout").is_source_scoped());
        assert!(ExpoFinderError::Extraction("bad json".into()).is_source_scoped());
        assert!(!ExpoFinderError::Storage("disk full".into()).is_source_scoped());
        assert!(!ExpoFinderError::credential_missing("Google Places", "GOOGLE_MAPS_API_KEY").is_source_scoped());
        assert!(!ExpoFinderError::not_found("source", "42").is_source_scoped());
    }
}
