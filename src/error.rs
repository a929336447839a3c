//! Error types shared across the crate.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by browser sessions and their engines.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A browser operation could not be carried out (missing resource,
    /// disallowed scheme, engine already shut down, and similar).
    #[error("browser operation failed: {0}")]
    Operation(String),

    /// No load-completion signal arrived within the wait bound.
    #[error("page load timed out after {timeout:?}")]
    LoadTimeout { timeout: Duration },

    /// A selector operation matched no elements in the current document.
    #[error("no elements match selector '{selector}'")]
    ElementNotFound { selector: String },

    /// Failed to reach the engine's DevTools endpoint.
    #[error("failed to connect to DevTools at {url}: {reason}")]
    Connection { url: String, reason: String },

    /// A DevTools command returned an error response.
    #[error("devtools command '{method}' failed with code {code}: {message}")]
    Command {
        method: String,
        code: i64,
        message: String,
    },

    /// A DevTools command got no response within its bound.
    #[error("devtools command '{method}' timed out after {duration:?}")]
    CommandTimeout { method: String, duration: Duration },

    /// Malformed or unexpected protocol traffic.
    #[error("devtools protocol error: {0}")]
    Protocol(String),

    /// Script evaluation raised an uncaught exception.
    #[error("script exception: {message}")]
    ScriptException { message: String },

    /// The given string could not be parsed as a URL.
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// HTTP transfer failure on the download path.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Filesystem or sink I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// Shorthand for the generic operation failure.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = BrowserError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = BrowserError::ElementNotFound {
            selector: "#missing".to_string(),
        };
        assert_eq!(err.to_string(), "no elements match selector '#missing'");

        let err = BrowserError::operation("ftp scheme is not supported");
        assert_eq!(
            err.to_string(),
            "browser operation failed: ftp scheme is not supported"
        );
    }

    #[test]
    fn test_load_timeout_mentions_bound() {
        let err = BrowserError::LoadTimeout {
            timeout: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("3s"));
    }
}
