//! Session configuration.
//!
//! Settings live in [`BrowserSettings`]. They can be read from TOML or
//! JSON files, overridden through `WEBPILOT_*` environment variables and
//! parsed command-line flags, and validated before a session starts.
//!
//! ```rust,no_run
//! use webpilot::config::BrowserSettings;
//!
//! let settings = BrowserSettings::from_file("webpilot.toml")
//!     .unwrap()
//!     .merge_with_env();
//! assert!(settings.validate().is_ok());
//! ```

mod settings;

pub use settings::{BrowserSettings, CliArgs, ConfigError, ProxyConfig, ProxyType};
