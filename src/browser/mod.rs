//! Browser module providing the programmatic browsing core.
//!
//! This module contains the session facade, the render engine abstraction
//! with its Chromium and scripted implementations, and the supporting
//! pieces for DOM scripting, cookies, and downloads.
//!
//! # Submodules
//!
//! - [`session`] - The [`Browser`] session facade
//! - [`engine`] - Render engine abstraction, configuration, and the scripted mock
//! - [`chrome`] - Chromium engine over the DevTools protocol
//! - [`cdp`] - DevTools WebSocket connection and command correlation
//! - [`page`] - Current-page state tracking
//! - [`dom`] - JavaScript snippet generation for DOM interaction
//! - [`cookies`] - Cookie model and Netscape export
//! - [`download`] - Out-of-band HTTP resource fetching

pub mod cdp;
pub mod chrome;
pub mod cookies;
pub mod dom;
pub mod download;
pub mod engine;
pub mod page;
pub mod session;

// Re-export commonly used types for convenience
pub use chrome::ChromeEngine;
pub use cookies::Cookie;
pub use download::Downloader;
pub use engine::{
    ClickAction, ConfirmHandler, ConsoleKind, ConsoleMessage, EngineConfig, EngineEvent,
    MockRenderEngine, PromptHandler, RenderEngine, RequestFilter, ScriptedElement, ScriptedPage,
};
pub use page::{PageState, PageStatus};
pub use session::Browser;
