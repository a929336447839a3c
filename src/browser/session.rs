//! Browser session facade.
//!
//! [`Browser`] is the public surface of the crate: one session drives one
//! page through a [`RenderEngine`]. Navigation is event-driven; the
//! session holds a persistent subscription to the engine's event stream
//! and awaits load completion under a timeout instead of polling. DOM
//! interaction goes through generated JavaScript snippets that report how
//! many elements they touched, so a selector that matches nothing becomes
//! an error instead of a silent no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::chrome::ChromeEngine;
use crate::browser::cookies::{self, Cookie};
use crate::browser::dom;
use crate::browser::download::Downloader;
use crate::browser::engine::{
    ConfirmHandler, ConsoleMessage, EngineConfig, EngineEvent, PromptHandler, RenderEngine,
    RequestFilter,
};
use crate::browser::page::PageState;
use crate::error::{BrowserError, Result};

/// A programmatic browsing session over one render engine instance.
///
/// The engine type is generic so the same session logic drives a real
/// Chromium ([`ChromeEngine`]) and the scripted
/// [`MockRenderEngine`](crate::browser::engine::MockRenderEngine) used in
/// tests.
pub struct Browser<E: RenderEngine = ChromeEngine> {
    engine: E,
    downloader: Downloader,
    /// Persistent event subscription. Subscribing once at construction
    /// means load completions are never missed between a navigation
    /// trigger and the wait that follows it.
    events: tokio::sync::Mutex<broadcast::Receiver<EngineEvent>>,
    state: Mutex<PageState>,
    load_scripts: RwLock<Vec<String>>,
    default_timeout: Duration,
    closed: AtomicBool,
}

impl Browser<ChromeEngine> {
    /// Starts a session backed by a Chromium engine.
    ///
    /// Launches a browser process, or attaches to a running one when the
    /// configuration carries a remote endpoint.
    pub async fn launch(config: EngineConfig) -> Result<Self> {
        let engine = ChromeEngine::new(config).await?;
        Self::from_engine(engine)
    }
}

impl<E: RenderEngine> Browser<E> {
    /// Starts a session backed by a freshly created engine of type `E`.
    pub async fn start(config: EngineConfig) -> Result<Self> {
        let engine = E::new(config).await?;
        Self::from_engine(engine)
    }

    /// Wraps an already running engine in a session.
    pub fn from_engine(engine: E) -> Result<Self> {
        let downloader = Downloader::new(engine.config())?;
        let events = engine.events();
        let default_timeout = Duration::from_millis(engine.config().timeout_ms);
        let session_id = Uuid::new_v4();
        info!(%session_id, "browser session started");

        Ok(Self {
            engine,
            downloader,
            events: tokio::sync::Mutex::new(events),
            state: Mutex::new(PageState::new(session_id)),
            load_scripts: RwLock::new(Vec::new()),
            default_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// The engine driving this session.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The engine configuration this session runs with.
    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Identifier of this session.
    pub fn session_id(&self) -> Uuid {
        self.state.lock().session_id
    }

    /// Snapshot of the current page state.
    pub fn page_state(&self) -> PageState {
        self.state.lock().clone()
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigates to `url` and waits for the load to finish.
    ///
    /// Returns whether the page loaded successfully; a vetoed or
    /// unreachable navigation returns `Ok(false)`. The wait is bounded by
    /// the configured timeout and an expiry is a
    /// [`LoadTimeout`](BrowserError::LoadTimeout) error.
    pub async fn load(&self, url: &str) -> Result<bool> {
        let url = Url::parse(url).map_err(|source| BrowserError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        info!(%url, "loading page");

        let mut events = self.events.lock().await;
        drain_stale_events(&mut events);

        self.state.lock().begin_navigation(url.clone());
        self.engine.navigate(&url).await?;

        let success = self
            .await_load_finished(&mut events, self.default_timeout)
            .await?;
        drop(events);

        self.finish_load(success).await?;
        Ok(success)
    }

    /// Waits for the next load to finish, e.g. after a click or script
    /// triggered a navigation.
    ///
    /// `timeout` defaults to the configured timeout. Events that arrived
    /// since the last wait are consumed first, so a navigation that
    /// already completed is observed, not missed.
    pub async fn wait_load(&self, timeout: Option<Duration>) -> Result<bool> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let mut events = self.events.lock().await;
        let success = self.await_load_finished(&mut events, timeout).await?;
        drop(events);

        self.finish_load(success).await?;
        Ok(success)
    }

    /// Sleeps for `duration` while background work keeps running.
    pub async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn await_load_finished(
        &self,
        events: &mut broadcast::Receiver<EngineEvent>,
        timeout: Duration,
    ) -> Result<bool> {
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::LoadFinished { url, success }) => {
                        debug!(
                            url = url.as_ref().map(Url::as_str).unwrap_or(""),
                            success, "load finished"
                        );
                        return Ok(success);
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscription lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(BrowserError::operation("engine event stream closed"));
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::LoadTimeout { timeout }),
        }
    }

    /// Syncs session state with the engine and runs registered load
    /// scripts after a successful load.
    async fn finish_load(&self, success: bool) -> Result<()> {
        let landed = self.engine.current_url().await?;
        self.state.lock().complete_navigation(success, landed);

        if success {
            let scripts = self.load_scripts.read().clone();
            for script in scripts {
                // Script failures do not fail the load they follow.
                if let Err(e) = self.engine.evaluate(&script).await {
                    warn!(error = %e, "load script failed");
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Page access
    // ========================================================================

    /// The rendered markup of the current page.
    pub async fn html(&self) -> Result<String> {
        self.engine.markup().await
    }

    /// The current page URL, if any navigation has happened.
    pub async fn url(&self) -> Result<Option<Url>> {
        self.engine.current_url().await
    }

    /// Whether the current markup matches `pattern` (a regular
    /// expression).
    pub async fn html_contains(&self, pattern: &str) -> Result<bool> {
        let re = Regex::new(pattern).map_err(|e| {
            BrowserError::operation(format!("invalid pattern '{pattern}': {e}"))
        })?;
        Ok(re.is_match(&self.engine.markup().await?))
    }

    /// Whether the current markup does not match `pattern`.
    pub async fn html_not_contains(&self, pattern: &str) -> Result<bool> {
        Ok(!self.html_contains(pattern).await?)
    }

    /// Resolves `path` against the current page URL.
    ///
    /// Absolute inputs pass through; without a current page, `path` must
    /// be absolute.
    pub async fn resolve_url(&self, path: &str) -> Result<Url> {
        let resolved = match self.engine.current_url().await? {
            Some(base) => base.join(path),
            None => Url::parse(path),
        };
        resolved.map_err(|source| BrowserError::InvalidUrl {
            url: path.to_string(),
            source,
        })
    }

    /// Evaluates JavaScript in the current page and returns the result
    /// as JSON.
    pub async fn run_script(&self, script: &str) -> Result<Value> {
        self.engine.evaluate(script).await
    }

    /// Registers a script to evaluate after every successful load.
    pub fn add_load_script(&self, script: impl Into<String>) {
        self.load_scripts.write().push(script.into());
    }

    /// Console and alert messages the page produced in this session.
    pub async fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.engine.console_log().await
    }

    // ========================================================================
    // DOM interaction
    // ========================================================================

    /// Clicks every element matching `selector`. Returns how many
    /// matched.
    pub async fn click(&self, selector: &str) -> Result<u64> {
        debug!(selector, "click");
        self.run_snippet(selector, dom::click(selector)).await
    }

    /// Checks every checkbox matching `selector`.
    pub async fn check(&self, selector: &str) -> Result<u64> {
        debug!(selector, "check");
        self.run_snippet(selector, dom::set_checked(selector, true))
            .await
    }

    /// Unchecks every checkbox matching `selector`.
    pub async fn uncheck(&self, selector: &str) -> Result<u64> {
        debug!(selector, "uncheck");
        self.run_snippet(selector, dom::set_checked(selector, false))
            .await
    }

    /// Clicks the radio button matching `selector`, firing its click
    /// handlers.
    pub async fn choose(&self, selector: &str) -> Result<u64> {
        debug!(selector, "choose");
        self.run_snippet(selector, dom::click(selector)).await
    }

    /// Marks every `<option>` matching `selector` as selected and fires
    /// the change event on its `<select>`.
    pub async fn select_option(&self, selector: &str) -> Result<u64> {
        debug!(selector, "select option");
        self.run_snippet(selector, dom::select_option(selector)).await
    }

    /// Sets the value of every input matching `selector`.
    pub async fn fill(&self, selector: &str, value: &str) -> Result<u64> {
        debug!(selector, "fill");
        self.run_snippet(selector, dom::fill(selector, value)).await
    }

    async fn run_snippet(&self, selector: &str, script: String) -> Result<u64> {
        let value = self.engine.evaluate(&script).await?;
        let count = dom::match_count(&value).unwrap_or(0);
        if count < 1 {
            return Err(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(count)
    }

    // ========================================================================
    // Cookies and downloads
    // ========================================================================

    /// Snapshot of the engine's cookie jar.
    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        self.engine.cookies().await
    }

    /// The cookie jar exported in Netscape `cookies.txt` format.
    ///
    /// Session cookies carry no expiry and are left out, matching what
    /// the format can represent.
    pub async fn cookies_string(&self) -> Result<String> {
        Ok(cookies::to_netscape(&self.engine.cookies().await?))
    }

    /// Downloads `url` into memory, sending the session's cookies.
    ///
    /// `url` may be relative to the current page. Only http and https
    /// are supported.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.resolve_url(url).await?;
        let header = self.cookie_header(&url).await?;
        self.downloader.fetch(&url, header.as_deref()).await
    }

    /// Streams `url` into `sink` and returns the number of bytes
    /// written.
    pub async fn download_to<W>(&self, url: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let url = self.resolve_url(url).await?;
        let header = self.cookie_header(&url).await?;
        self.downloader.fetch_to(&url, header.as_deref(), sink).await
    }

    async fn cookie_header(&self, url: &Url) -> Result<Option<String>> {
        Ok(cookies::header_for_url(&self.engine.cookies().await?, url))
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    /// Installs a per-request veto hook.
    ///
    /// The filter sees the request method and URL before dispatch;
    /// returning false drops the request. A dropped page navigation
    /// surfaces as an unsuccessful load.
    pub async fn set_request_filter<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&str, &Url) -> bool + Send + Sync + 'static,
    {
        self.engine
            .set_request_filter(Some(Arc::new(filter) as RequestFilter))
            .await
    }

    /// Removes the request filter; all requests pass again.
    pub async fn clear_request_filter(&self) -> Result<()> {
        self.engine.set_request_filter(None).await
    }

    /// Installs the handler answering `window.confirm` dialogs.
    ///
    /// Without a handler, confirms are answered with false.
    pub async fn set_confirm_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.engine
            .set_confirm_handler(Some(Arc::new(handler) as ConfirmHandler))
            .await
    }

    /// Removes the confirm handler.
    pub async fn clear_confirm_handler(&self) -> Result<()> {
        self.engine.set_confirm_handler(None).await
    }

    /// Installs the handler answering `window.prompt` dialogs. Returning
    /// `None` cancels the prompt.
    ///
    /// Without a handler, prompts are cancelled.
    pub async fn set_prompt_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&str, &str, &str) -> Option<String> + Send + Sync + 'static,
    {
        self.engine
            .set_prompt_handler(Some(Arc::new(handler) as PromptHandler))
            .await
    }

    /// Removes the prompt handler.
    pub async fn clear_prompt_handler(&self) -> Result<()> {
        self.engine.set_prompt_handler(None).await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shuts the session down. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.engine.is_running().await {
            self.engine.shutdown().await?;
        }
        info!(session_id = %self.session_id(), "browser session closed");
        Ok(())
    }

    /// Whether the underlying engine is still running.
    pub async fn is_running(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.engine.is_running().await
    }
}

/// Discards events left over from before the navigation being started,
/// so a stale completion is never mistaken for the new one.
fn drain_stale_events(events: &mut broadcast::Receiver<EngineEvent>) {
    loop {
        match events.try_recv() {
            Ok(_) => continue,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::engine::{MockRenderEngine, ScriptedPage};

    async fn session_with_page(page: ScriptedPage) -> Browser<MockRenderEngine> {
        let engine = MockRenderEngine::new(EngineConfig::default())
            .await
            .unwrap();
        engine.register_page(page).await;
        Browser::from_engine(engine).unwrap()
    }

    #[tokio::test]
    async fn test_load_returns_success_and_updates_state() {
        let browser = session_with_page(ScriptedPage::new(
            "http://fixture.test/",
            "<html><body>home</body></html>",
        ))
        .await;

        assert!(browser.load("http://fixture.test/").await.unwrap());
        let state = browser.page_state();
        assert!(state.is_ready());
        assert_eq!(
            state.url.as_ref().map(Url::as_str),
            Some("http://fixture.test/")
        );
    }

    #[tokio::test]
    async fn test_load_rejects_unparseable_url() {
        let browser = session_with_page(ScriptedPage::new("http://fixture.test/", "x")).await;
        let err = browser.load("not a url").await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_html_contains_is_a_regex_match() {
        let browser = session_with_page(ScriptedPage::new(
            "http://fixture.test/",
            "<html><body><h1>Welcome back</h1></body></html>",
        ))
        .await;
        browser.load("http://fixture.test/").await.unwrap();

        assert!(browser.html_contains(r"Welcome\s+back").await.unwrap());
        assert!(browser.html_not_contains(r"Goodbye").await.unwrap());
        assert!(browser.html_contains(r"<h\d>").await.unwrap());
    }

    #[tokio::test]
    async fn test_html_contains_rejects_bad_pattern() {
        let browser = session_with_page(ScriptedPage::new("http://fixture.test/", "x")).await;
        browser.load("http://fixture.test/").await.unwrap();
        assert!(browser.html_contains("(unclosed").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_url_joins_against_current_page() {
        let browser = session_with_page(ScriptedPage::new(
            "http://fixture.test/dir/page.html",
            "x",
        ))
        .await;
        browser.load("http://fixture.test/dir/page.html").await.unwrap();

        let resolved = browser.resolve_url("../other.html").await.unwrap();
        assert_eq!(resolved.as_str(), "http://fixture.test/other.html");

        let absolute = browser.resolve_url("https://elsewhere.test/x").await.unwrap();
        assert_eq!(absolute.as_str(), "https://elsewhere.test/x");
    }

    #[tokio::test]
    async fn test_resolve_url_without_page_requires_absolute() {
        let browser = session_with_page(ScriptedPage::new("http://fixture.test/", "x")).await;
        assert!(browser.resolve_url("relative.html").await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let browser = session_with_page(ScriptedPage::new("http://fixture.test/", "x")).await;
        assert!(browser.is_running().await);
        browser.close().await.unwrap();
        browser.close().await.unwrap();
        assert!(!browser.is_running().await);
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let browser = session_with_page(ScriptedPage::new("http://fixture.test/", "x")).await;
        browser.close().await.unwrap();
        assert!(browser.load("http://fixture.test/").await.is_err());
    }
}
