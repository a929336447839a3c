//! # Webpilot
//!
//! A programmatic headless browser library written in Rust.
//!
//! Webpilot drives a real browser engine from code: navigate, fill and
//! submit forms, click through pages, run JavaScript, inspect cookies,
//! and download resources, all from an async Rust API.
//!
//! ## Features
//!
//! - **Event-driven Navigation**: Loads complete through engine events, bounded by timeouts
//! - **DOM Interaction**: Click, check, choose, select, and fill by CSS selector
//! - **JavaScript Execution**: Evaluate scripts and collect their results as JSON
//! - **Request Filtering**: Veto individual requests before they are dispatched
//! - **Dialog Handling**: Answer `confirm` and `prompt` dialogs from Rust callbacks
//! - **Cookie Access**: Snapshot the jar or export it in Netscape `cookies.txt` format
//! - **Downloads**: Fetch resources over plain HTTP with the session's cookies
//! - **Layered Configuration**: settings files, `WEBPILOT_*` variables, CLI flags
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webpilot::{browser::Browser, config::BrowserSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = BrowserSettings::default().with_headless(true);
//!     let browser = Browser::launch(settings.to_engine_config()).await?;
//!
//!     browser.load("https://example.org/").await?;
//!     browser.fill("input[name=q]", "rust").await?;
//!     browser.click("button[type=submit]").await?;
//!     browser.wait_load(None).await?;
//!
//!     println!("{}", browser.html().await?);
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Session facade, render engines, DOM scripting, cookies, downloads
//! - [`config`]: Settings resolution from files, the environment, and flags
//! - [`error`]: The crate-wide error type
//!
//! ## Architecture
//!
//! A session drives exactly one page through a render engine. The engine
//! is a trait, so the same session logic runs against a real Chromium or
//! the scripted mock used in tests:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Webpilot                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      ┌───────────┐                              │
//! │                      │  Browser  │  session facade              │
//! │                      └─────┬─────┘                              │
//! │       ┌────────────────────┼────────────────────┐               │
//! │  ┌────┴────┐          ┌────┴────┐          ┌────┴─────┐         │
//! │  │   DOM   │          │ Render  │          │ Download │         │
//! │  │ Snippets│          │ Engine  │          │  Client  │         │
//! │  └─────────┘          └────┬────┘          └──────────┘         │
//! │                  ┌─────────┴─────────┐                          │
//! │            ┌─────┴──────┐     ┌──────┴──────┐                   │
//! │            │ ChromeEngine│     │ MockRender  │                  │
//! │            │  (DevTools) │     │   Engine    │                  │
//! │            └────────────┘     └─────────────┘                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! Settings start from defaults; a TOML or JSON file, `WEBPILOT_*`
//! environment variables, and CLI flags each override what came before.
//! See [`config::BrowserSettings`] for every option.

/// Version from the package manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from the package manifest.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `name vX.Y.Z`, for banners and logs.
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

/// Browser session facade, render engines, DOM scripting, cookies, downloads.
pub mod browser;

/// Settings resolution from files, the environment, and flags.
pub mod config;

/// The crate-wide error type.
pub mod error;

// Convenience re-exports so embedders rarely need the module paths.

pub use browser::{
    Browser, ChromeEngine, ClickAction, ConsoleKind, ConsoleMessage, Cookie, Downloader,
    EngineConfig, EngineEvent, MockRenderEngine, PageState, PageStatus, RenderEngine,
    ScriptedElement, ScriptedPage,
};

pub use config::{BrowserSettings, CliArgs, ConfigError, ProxyConfig, ProxyType};

pub use error::{BrowserError, Result};

/// One-line import for the types most sessions touch.
///
/// ```rust
/// use webpilot::prelude::*;
/// ```
pub mod prelude {
    pub use crate::browser::{Browser, Cookie, EngineConfig, EngineEvent, RenderEngine};
    pub use crate::config::{BrowserSettings, CliArgs};
    pub use crate::error::{BrowserError, Result};
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_constants_are_wired() {
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
        assert!(FULL_VERSION.starts_with(NAME));
    }

    #[test]
    fn prelude_exposes_core_types() {
        use crate::prelude::*;
        let _ = VERSION;
        let _: Option<Browser> = None;
    }
}
