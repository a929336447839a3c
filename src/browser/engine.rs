//! Render-engine abstraction layer.
//!
//! This module defines the capability trait a browser session drives:
//! navigation, script evaluation, markup access, cookie enumeration,
//! request filtering, and dialog handling. The production implementation
//! speaks the DevTools protocol (see [`chrome`](crate::browser::chrome));
//! [`MockRenderEngine`] is a scripted in-memory implementation for tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use webpilot::browser::{EngineConfig, MockRenderEngine, RenderEngine, ScriptedPage};
//!
//! #[tokio::main]
//! async fn main() -> webpilot::Result<()> {
//!     let engine = MockRenderEngine::new(EngineConfig::default()).await?;
//!     engine
//!         .register_page(ScriptedPage::new(
//!             "http://fixture.test/index.html",
//!             "<html><body>Hello</body></html>",
//!         ))
//!         .await;
//!
//!     engine.navigate(&"http://fixture.test/index.html".parse()?).await?;
//!     println!("markup: {}", engine.markup().await?);
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::cookies::Cookie;
use crate::browser::dom::{self, SnippetOp};
use crate::error::{BrowserError, Result};

/// Number of engine events buffered per subscriber before lagging.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 128;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration options for render-engine initialization.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Run the browser without a visible window.
    pub headless: bool,

    /// Window dimensions as (width, height) in pixels.
    pub window_size: (u32, u32),

    /// Custom user agent string. If None, uses the engine default.
    pub user_agent: Option<String>,

    /// Proxy server URL (e.g., "http://proxy.example.com:8080").
    pub proxy: Option<String>,

    /// Path to the browser executable. If None, uses a well-known name.
    pub executable_path: Option<String>,

    /// Additional browser launch arguments.
    pub args: Vec<String>,

    /// Directory for persistent browser state. If None, a throwaway
    /// profile is used.
    pub user_data_dir: Option<String>,

    /// DevTools HTTP endpoint of an already running browser (e.g.,
    /// "http://127.0.0.1:9222"). If set, no process is launched.
    pub remote_endpoint: Option<String>,

    /// Timeout for individual engine commands and the default load
    /// wait, in milliseconds.
    pub timeout_ms: u64,

    /// Accept pages with invalid TLS certificates.
    pub ignore_certificate_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1280, 720),
            user_agent: None,
            proxy: None,
            executable_path: None,
            args: Vec::new(),
            user_data_dir: None,
            remote_endpoint: None,
            timeout_ms: 30_000,
            ignore_certificate_errors: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new EngineConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets headless mode.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Sets window size.
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    /// Sets a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets a proxy server.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the browser executable path.
    pub fn executable_path(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Attaches to a running browser instead of launching one.
    pub fn remote_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.remote_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the directory for persistent browser state.
    pub fn user_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.user_data_dir = Some(dir.into());
        self
    }

    /// Sets the command/load timeout in milliseconds.
    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = timeout;
        self
    }

    /// Adds a browser launch argument.
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets certificate-error tolerance.
    pub fn ignore_certificate_errors(mut self, ignore: bool) -> Self {
        self.ignore_certificate_errors = ignore;
        self
    }
}

// ============================================================================
// Events and handler types
// ============================================================================

/// Origin of a recorded page message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKind {
    /// Emitted through the console API.
    Console,
    /// Raised as an alert dialog (auto-accepted).
    Alert,
}

/// A console or alert message captured from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMessage {
    /// Where the message came from.
    pub kind: ConsoleKind,
    /// Message text.
    pub message: String,
    /// Script source, when the engine reports one.
    pub source: Option<String>,
    /// Line number within the source, when reported.
    pub line: Option<u32>,
}

impl ConsoleMessage {
    /// Creates a console-API message.
    pub fn console(message: impl Into<String>) -> Self {
        Self {
            kind: ConsoleKind::Console,
            message: message.into(),
            source: None,
            line: None,
        }
    }

    /// Creates an alert message.
    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            kind: ConsoleKind::Alert,
            message: message.into(),
            source: None,
            line: None,
        }
    }
}

impl std::fmt::Display for ConsoleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.source) {
            (ConsoleKind::Alert, _) => write!(f, "Javascript alert: {}", self.message),
            (ConsoleKind::Console, Some(source)) => write!(
                f,
                "Javascript console ({}:{}): {}",
                source,
                self.line.unwrap_or(0),
                self.message
            ),
            (ConsoleKind::Console, None) => {
                write!(f, "Javascript console: {}", self.message)
            }
        }
    }
}

/// Events an engine publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A navigation finished, successfully or not.
    LoadFinished {
        /// Landing URL, when known.
        url: Option<Url>,
        /// Whether the page loaded successfully.
        success: bool,
    },
    /// The page produced a console or alert message.
    Console(ConsoleMessage),
}

/// Per-request veto hook.
///
/// Called with the request method (uppercase) and URL before dispatch;
/// returning false drops the request.
pub type RequestFilter = Arc<dyn Fn(&str, &Url) -> bool + Send + Sync>;

/// Decides `window.confirm` dialogs. Receives the page URL and the
/// dialog message; the return value answers the dialog.
pub type ConfirmHandler = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Answers `window.prompt` dialogs. Receives the page URL, the dialog
/// message, and the default text; `None` cancels the prompt.
pub type PromptHandler = Arc<dyn Fn(&str, &str, &str) -> Option<String> + Send + Sync>;

// ============================================================================
// The engine trait
// ============================================================================

/// Capability interface a browser session drives.
///
/// Implementations own all page, cookie, and dialog state for one
/// session; two engine instances never share anything. Load completion
/// is published on the event stream returned by [`events`](Self::events),
/// so waiters subscribe and await instead of polling.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Creates an engine instance with the given configuration.
    async fn new(config: EngineConfig) -> Result<Self>
    where
        Self: Sized;

    /// Shuts the engine down and releases its resources.
    async fn shutdown(&self) -> Result<()>;

    /// Begins navigating the current page to `url`.
    ///
    /// Completion (success or failure) is reported through the event
    /// stream, not the return value; an error here means the command
    /// itself could not be issued.
    async fn navigate(&self, url: &Url) -> Result<()>;

    /// Evaluates JavaScript in the current page, returning the result
    /// as JSON.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Returns the rendered markup of the current page.
    async fn markup(&self) -> Result<String>;

    /// Returns the current page URL, if any navigation has happened.
    async fn current_url(&self) -> Result<Option<Url>>;

    /// Snapshots the engine's cookie jar.
    async fn cookies(&self) -> Result<Vec<Cookie>>;

    /// Returns the console and alert messages captured so far.
    async fn console_log(&self) -> Vec<ConsoleMessage>;

    /// Subscribes to engine events. Only events published after the
    /// subscription are observed.
    fn events(&self) -> broadcast::Receiver<EngineEvent>;

    /// Installs or clears the per-request veto hook.
    async fn set_request_filter(&self, filter: Option<RequestFilter>) -> Result<()>;

    /// Installs or clears the confirm-dialog handler. Without one,
    /// confirms are answered with false.
    async fn set_confirm_handler(&self, handler: Option<ConfirmHandler>) -> Result<()>;

    /// Installs or clears the prompt-dialog handler. Without one,
    /// prompts are cancelled.
    async fn set_prompt_handler(&self, handler: Option<PromptHandler>) -> Result<()>;

    /// Returns the engine configuration.
    fn config(&self) -> &EngineConfig;

    /// Checks whether the engine is still running.
    async fn is_running(&self) -> bool;
}

// ============================================================================
// Scripted mock engine
// ============================================================================

/// What clicking a scripted element does.
#[derive(Debug, Clone, Default)]
pub enum ClickAction {
    /// Nothing beyond the click itself.
    #[default]
    None,
    /// Mark the element checked (radio-button behavior).
    Check,
    /// Navigate to the given (possibly relative) URL.
    Navigate(String),
    /// Submit a form: collect the value of each `(parameter, selector)`
    /// pair and navigate to `action` with them as the query string.
    SubmitForm {
        action: String,
        fields: Vec<(String, String)>,
    },
}

/// State of one element on a scripted page, keyed by the exact selector
/// tests and session code use to address it.
#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
    /// Current value property.
    pub value: String,
    /// Current checked property.
    pub checked: bool,
    /// Current selected property.
    pub selected: bool,
    /// Behavior on click.
    pub on_click: ClickAction,
}

impl ScriptedElement {
    /// A text input with an initial value.
    pub fn text_input(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// A checkbox in the given state.
    pub fn checkbox(checked: bool) -> Self {
        Self {
            checked,
            ..Self::default()
        }
    }

    /// A radio button; clicking it marks it checked.
    pub fn radio() -> Self {
        Self {
            on_click: ClickAction::Check,
            ..Self::default()
        }
    }

    /// A dropdown option in the given state.
    pub fn option(selected: bool) -> Self {
        Self {
            selected,
            ..Self::default()
        }
    }

    /// A link navigating to `target` when clicked.
    pub fn link(target: impl Into<String>) -> Self {
        Self {
            on_click: ClickAction::Navigate(target.into()),
            ..Self::default()
        }
    }

    /// A submit control posting the given fields to `action`.
    pub fn submit(
        action: impl Into<String>,
        fields: Vec<(impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            on_click: ClickAction::SubmitForm {
                action: action.into(),
                fields: fields
                    .into_iter()
                    .map(|(name, sel)| (name.into(), sel.into()))
                    .collect(),
            },
            ..Self::default()
        }
    }
}

/// A page the mock engine can serve, registered under its absolute URL.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    /// Absolute URL the page is served at.
    pub url: String,
    /// Markup returned for this page.
    pub markup: String,
    /// Elements reachable by selector on this page.
    pub elements: HashMap<String, ScriptedElement>,
    /// Cookies the page sets when it loads.
    pub cookies: Vec<Cookie>,
    /// Whether navigating here succeeds.
    pub load_success: bool,
}

impl ScriptedPage {
    /// Creates a page with the given URL and markup.
    pub fn new(url: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            markup: markup.into(),
            elements: HashMap::new(),
            cookies: Vec::new(),
            load_success: true,
        }
    }

    /// Adds an element addressable by `selector`.
    pub fn with_element(mut self, selector: impl Into<String>, element: ScriptedElement) -> Self {
        self.elements.insert(selector.into(), element);
        self
    }

    /// Adds a cookie set when the page loads.
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Marks navigation to this page as failing.
    pub fn failing(mut self) -> Self {
        self.load_success = false;
        self
    }
}

type ScriptStub = Box<dyn Fn(&mut ScriptedPage) -> Value + Send + Sync>;

// String literals capture into one group per quote kind, read back
// through `quoted`.
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:window\.)?location(?:\.href)?\s*=\s*(?:'(?P<url1>[^']*)'|"(?P<url2>[^"]*)")\s*;?\s*$"#,
    )
    .unwrap()
});
static ALERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:window\.)?alert\(\s*(?:'(?P<msg1>[^']*)'|"(?P<msg2>[^"]*)")\s*\)\s*;?\s*$"#,
    )
    .unwrap()
});
static CONFIRM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:window\.)?confirm\(\s*(?:'(?P<msg1>[^']*)'|"(?P<msg2>[^"]*)")\s*\)\s*;?\s*$"#,
    )
    .unwrap()
});
static PROMPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(?:window\.)?prompt\(\s*(?:'(?P<msg1>[^']*)'|"(?P<msg2>[^"]*)")(?:\s*,\s*(?:'(?P<def1>[^']*)'|"(?P<def2>[^"]*)"))?\s*\)\s*;?\s*$"#,
    )
    .unwrap()
});
static CONSOLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*console\.(?:log|info|warn|error)\(\s*(?:'(?P<msg1>[^']*)'|"(?P<msg2>[^"]*)")\s*\)\s*;?\s*$"#,
    )
    .unwrap()
});

/// Reads a quoted argument from whichever quote-kind group matched.
fn quoted<'t>(caps: &regex::Captures<'t>, single: &str, double: &str) -> &'t str {
    caps.name(single)
        .or_else(|| caps.name(double))
        .map(|m| m.as_str())
        .unwrap_or("")
}

/// Scripted render engine for tests.
///
/// Behaves like a browser whose web is the set of registered
/// [`ScriptedPage`]s: navigation serves them, selector snippets operate
/// on their element tables, and a handful of recognized script forms
/// (location assignment, alert/confirm/prompt, console calls) behave as
/// a page would. Everything else evaluates to a stubbed or null value.
pub struct MockRenderEngine {
    config: EngineConfig,
    pages: Arc<RwLock<HashMap<String, ScriptedPage>>>,
    current: Arc<RwLock<Option<ScriptedPage>>>,
    cookies: Arc<RwLock<Vec<Cookie>>>,
    console: Arc<RwLock<Vec<ConsoleMessage>>>,
    stubs: Arc<RwLock<HashMap<String, ScriptStub>>>,
    request_filter: Arc<RwLock<Option<RequestFilter>>>,
    confirm_handler: Arc<RwLock<Option<ConfirmHandler>>>,
    prompt_handler: Arc<RwLock<Option<PromptHandler>>>,
    events: broadcast::Sender<EngineEvent>,
    running: Arc<RwLock<bool>>,
}

#[async_trait]
impl RenderEngine for MockRenderEngine {
    async fn new(config: EngineConfig) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            pages: Arc::new(RwLock::new(HashMap::new())),
            current: Arc::new(RwLock::new(None)),
            cookies: Arc::new(RwLock::new(Vec::new())),
            console: Arc::new(RwLock::new(Vec::new())),
            stubs: Arc::new(RwLock::new(HashMap::new())),
            request_filter: Arc::new(RwLock::new(None)),
            confirm_handler: Arc::new(RwLock::new(None)),
            prompt_handler: Arc::new(RwLock::new(None)),
            events,
            running: Arc::new(RwLock::new(true)),
        })
    }

    async fn shutdown(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(BrowserError::operation("engine is not running"));
        }
        *running = false;
        Ok(())
    }

    async fn navigate(&self, url: &Url) -> Result<()> {
        self.ensure_running().await?;
        self.perform_navigation(url.clone()).await;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.ensure_running().await?;

        if let Some(op) = dom::parse_snippet(script) {
            return self.apply_snippet(op).await;
        }

        if let Some(caps) = LOCATION_RE.captures(script) {
            let target = quoted(&caps, "url1", "url2").to_string();
            if let Some(url) = self.resolve(&target).await {
                self.perform_navigation(url).await;
            } else {
                self.publish(EngineEvent::LoadFinished {
                    url: None,
                    success: false,
                });
            }
            return Ok(Value::Null);
        }

        if let Some(caps) = ALERT_RE.captures(script) {
            let message = ConsoleMessage::alert(quoted(&caps, "msg1", "msg2"));
            self.record_console(message).await;
            return Ok(Value::Null);
        }

        if let Some(caps) = CONSOLE_RE.captures(script) {
            let message = ConsoleMessage::console(quoted(&caps, "msg1", "msg2"));
            self.record_console(message).await;
            return Ok(Value::Null);
        }

        if let Some(caps) = CONFIRM_RE.captures(script) {
            let handler = self.confirm_handler.read().await.clone();
            let page_url = self.page_url_string().await;
            let answer = match handler {
                Some(handler) => handler(&page_url, quoted(&caps, "msg1", "msg2")),
                None => false,
            };
            return Ok(Value::Bool(answer));
        }

        if let Some(caps) = PROMPT_RE.captures(script) {
            let handler = self.prompt_handler.read().await.clone();
            let page_url = self.page_url_string().await;
            let default = quoted(&caps, "def1", "def2");
            let answer = match handler {
                Some(handler) => handler(&page_url, quoted(&caps, "msg1", "msg2"), default),
                None => None,
            };
            return Ok(match answer {
                Some(text) => Value::String(text),
                None => Value::Null,
            });
        }

        let stubs = self.stubs.read().await;
        if let Some(stub) = stubs.get(script) {
            let mut current = self.current.write().await;
            if let Some(page) = current.as_mut() {
                return Ok(stub(page));
            }
            let mut empty = ScriptedPage::new("", "");
            return Ok(stub(&mut empty));
        }

        Ok(Value::Null)
    }

    async fn markup(&self) -> Result<String> {
        self.ensure_running().await?;
        let current = self.current.read().await;
        Ok(current
            .as_ref()
            .map(|page| page.markup.clone())
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<Option<Url>> {
        self.ensure_running().await?;
        let current = self.current.read().await;
        Ok(current
            .as_ref()
            .and_then(|page| Url::parse(&page.url).ok()))
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        self.ensure_running().await?;
        Ok(self.cookies.read().await.clone())
    }

    async fn console_log(&self) -> Vec<ConsoleMessage> {
        self.console.read().await.clone()
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn set_request_filter(&self, filter: Option<RequestFilter>) -> Result<()> {
        *self.request_filter.write().await = filter;
        Ok(())
    }

    async fn set_confirm_handler(&self, handler: Option<ConfirmHandler>) -> Result<()> {
        *self.confirm_handler.write().await = handler;
        Ok(())
    }

    async fn set_prompt_handler(&self, handler: Option<PromptHandler>) -> Result<()> {
        *self.prompt_handler.write().await = handler;
        Ok(())
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

impl MockRenderEngine {
    /// Registers a page under its URL, replacing any previous one.
    pub async fn register_page(&self, page: ScriptedPage) {
        self.pages.write().await.insert(page.url.clone(), page);
    }

    /// Stubs an arbitrary script: when `script` is evaluated, `f` runs
    /// against the current page state and its return value is the
    /// evaluation result.
    pub async fn stub_script<F>(&self, script: impl Into<String>, f: F)
    where
        F: Fn(&mut ScriptedPage) -> Value + Send + Sync + 'static,
    {
        self.stubs
            .write()
            .await
            .insert(script.into(), Box::new(f));
    }

    /// Adds a cookie to the jar directly.
    pub async fn simulate_cookie(&self, cookie: Cookie) {
        self.cookies.write().await.push(cookie);
    }

    /// Publishes a load event without touching page state.
    pub async fn simulate_load_finished(&self, url: Option<Url>, success: bool) {
        self.publish(EngineEvent::LoadFinished { url, success });
    }

    /// Returns the live state of an element on the current page.
    pub async fn element_state(&self, selector: &str) -> Option<ScriptedElement> {
        let current = self.current.read().await;
        current
            .as_ref()
            .and_then(|page| page.elements.get(selector).cloned())
    }

    async fn ensure_running(&self) -> Result<()> {
        if !*self.running.read().await {
            return Err(BrowserError::operation("engine is not running"));
        }
        Ok(())
    }

    fn publish(&self, event: EngineEvent) {
        // Send only fails when nobody subscribes, which is fine.
        let _ = self.events.send(event);
    }

    async fn record_console(&self, message: ConsoleMessage) {
        debug!(target: "webpilot::mock", "{}", message);
        self.console.write().await.push(message.clone());
        self.publish(EngineEvent::Console(message));
    }

    async fn page_url_string(&self) -> String {
        let current = self.current.read().await;
        current
            .as_ref()
            .map(|page| page.url.clone())
            .unwrap_or_default()
    }

    async fn resolve(&self, target: &str) -> Option<Url> {
        if let Ok(url) = Url::parse(target) {
            return Some(url);
        }
        let current = self.current.read().await;
        let base = Url::parse(&current.as_ref()?.url).ok()?;
        base.join(target).ok()
    }

    async fn perform_navigation(&self, url: Url) {
        let filter = self.request_filter.read().await.clone();
        if let Some(filter) = filter {
            if !filter("GET", &url) {
                info!(target: "webpilot::mock", %url, "request vetoed by filter");
                self.publish(EngineEvent::LoadFinished {
                    url: Some(url),
                    success: false,
                });
                return;
            }
        }

        if url.scheme() != "http" && url.scheme() != "https" {
            warn!(target: "webpilot::mock", %url, "unsupported scheme");
            self.publish(EngineEvent::LoadFinished {
                url: Some(url),
                success: false,
            });
            return;
        }

        let page = {
            let pages = self.pages.read().await;
            pages.get(url.as_str()).cloned()
        };

        match page {
            Some(page) if page.load_success => {
                {
                    let mut cookies = self.cookies.write().await;
                    cookies.extend(page.cookies.iter().cloned());
                }
                *self.current.write().await = Some(page);
                self.publish(EngineEvent::LoadFinished {
                    url: Some(url),
                    success: true,
                });
            }
            _ => {
                self.publish(EngineEvent::LoadFinished {
                    url: Some(url),
                    success: false,
                });
            }
        }
    }

    async fn apply_snippet(&self, op: SnippetOp) -> Result<Value> {
        let (count, click_effect) = {
            let mut current = self.current.write().await;
            let Some(page) = current.as_mut() else {
                return Ok(Value::from(0u64));
            };

            match op {
                SnippetOp::Click { selector } => {
                    let action = match page.elements.get_mut(&selector) {
                        Some(element) => {
                            if matches!(element.on_click, ClickAction::Check) {
                                element.checked = true;
                            }
                            Some(element.on_click.clone())
                        }
                        None => None,
                    };
                    match action {
                        None => (0u64, None),
                        Some(ClickAction::None) | Some(ClickAction::Check) => (1, None),
                        Some(ClickAction::Navigate(target)) => (1, Some(target)),
                        Some(ClickAction::SubmitForm { action, fields }) => {
                            let mut query = url::form_urlencoded::Serializer::new(String::new());
                            for (name, field_selector) in &fields {
                                let value = page
                                    .elements
                                    .get(field_selector)
                                    .map(|el| el.value.clone())
                                    .unwrap_or_default();
                                query.append_pair(name, &value);
                            }
                            (1, Some(format!("{}?{}", action, query.finish())))
                        }
                    }
                }
                SnippetOp::SetChecked { selector, checked } => {
                    match page.elements.get_mut(&selector) {
                        Some(element) => {
                            element.checked = checked;
                            (1, None)
                        }
                        None => (0, None),
                    }
                }
                SnippetOp::SelectOption { selector } => match page.elements.get_mut(&selector) {
                    Some(element) => {
                        element.selected = true;
                        (1, None)
                    }
                    None => (0, None),
                },
                SnippetOp::Fill { selector, value } => match page.elements.get_mut(&selector) {
                    Some(element) => {
                        element.value = value;
                        (1, None)
                    }
                    None => (0, None),
                },
            }
        };

        if let Some(target) = click_effect {
            if let Some(url) = self.resolve(&target).await {
                self.perform_navigation(url).await;
            }
        }

        Ok(Value::from(count))
    }
}
