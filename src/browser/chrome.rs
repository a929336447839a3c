//! Chromium-backed render engine.
//!
//! Implements [`RenderEngine`] over the DevTools protocol: a Chromium
//! process is launched (or an already running one attached to), a
//! WebSocket connection is opened to one page target, and protocol
//! events are translated into engine events. Request filtering rides on
//! the Fetch domain, dialogs on `Page.handleJavaScriptDialog`, console
//! capture on `Runtime.consoleAPICalled`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::browser::cdp::{CdpConnection, CdpEvent};
use crate::browser::cookies::Cookie;
use crate::browser::engine::{
    ConfirmHandler, ConsoleMessage, EngineConfig, EngineEvent, PromptHandler, RenderEngine,
    RequestFilter, EVENT_CHANNEL_CAPACITY,
};
use crate::error::{BrowserError, Result};

/// Executables tried in order when no explicit path is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

static DEVTOOLS_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DevTools listening on (ws://\S+)").unwrap());

/// Shared state the event-dispatch task and the engine both touch.
///
/// Handlers are cloned out of the locks before invocation so no guard is
/// ever held across an await.
struct EngineState {
    request_filter: RwLock<Option<RequestFilter>>,
    confirm_handler: RwLock<Option<ConfirmHandler>>,
    prompt_handler: RwLock<Option<PromptHandler>>,
    console: RwLock<Vec<ConsoleMessage>>,
    current_url: RwLock<Option<Url>>,
    load_failed: RwLock<bool>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            request_filter: RwLock::new(None),
            confirm_handler: RwLock::new(None),
            prompt_handler: RwLock::new(None),
            console: RwLock::new(Vec::new()),
            current_url: RwLock::new(None),
            load_failed: RwLock::new(false),
        }
    }

    fn record_console(&self, message: ConsoleMessage, events: &broadcast::Sender<EngineEvent>) {
        debug!(target: "webpilot::chrome", "{}", message);
        self.console.write().push(message.clone());
        let _ = events.send(EngineEvent::Console(message));
    }
}

/// Render engine driving a headless Chromium through DevTools.
pub struct ChromeEngine {
    config: EngineConfig,
    conn: Arc<CdpConnection>,
    state: Arc<EngineState>,
    events: broadcast::Sender<EngineEvent>,
    child: Mutex<Option<Child>>,
    dispatch_handle: tokio::task::JoinHandle<()>,
    running: RwLock<bool>,
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn new(config: EngineConfig) -> Result<Self> {
        match config.remote_endpoint.clone() {
            Some(endpoint) => Self::attach(&endpoint, config).await,
            None => Self::launch(config).await,
        }
    }

    async fn shutdown(&self) -> Result<()> {
        {
            let mut running = self.running.write();
            if !*running {
                return Err(BrowserError::operation("engine is not running"));
            }
            *running = false;
        }

        let launched = self.child.lock().is_some();
        let close_method = if launched { "Browser.close" } else { "Page.close" };
        if let Err(e) = self.conn.command(close_method, json!({})).await {
            debug!(error = %e, method = close_method, "close command failed during shutdown");
        }

        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "browser process already gone");
            }
        }

        self.conn.abort();
        self.dispatch_handle.abort();
        info!("chrome engine shut down");
        Ok(())
    }

    async fn navigate(&self, url: &Url) -> Result<()> {
        self.ensure_running()?;
        info!(%url, "navigating");
        *self.state.load_failed.write() = false;

        let reply = self
            .conn
            .command("Page.navigate", json!({ "url": url.as_str() }))
            .await?;

        if let Some(error_text) = reply.get("errorText").and_then(Value::as_str) {
            warn!(%url, error_text, "navigation refused");
            let _ = self.events.send(EngineEvent::LoadFinished {
                url: Some(url.clone()),
                success: false,
            });
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.ensure_running()?;
        let reply = self
            .conn
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": script,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = reply.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown script error")
                .to_string();
            return Err(BrowserError::ScriptException { message });
        }

        Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    async fn markup(&self) -> Result<String> {
        let value = self
            .evaluate("document.documentElement ? document.documentElement.outerHTML : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> Result<Option<Url>> {
        self.ensure_running()?;
        Ok(self.state.current_url.read().clone())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        self.ensure_running()?;
        let reply = self.conn.command("Storage.getCookies", json!({})).await?;
        let cookies = reply
            .get("cookies")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(cookie_from_json).collect())
            .unwrap_or_default();
        Ok(cookies)
    }

    async fn console_log(&self) -> Vec<ConsoleMessage> {
        self.state.console.read().clone()
    }

    fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn set_request_filter(&self, filter: Option<RequestFilter>) -> Result<()> {
        self.ensure_running()?;
        let enable = filter.is_some();
        *self.state.request_filter.write() = filter;
        if enable {
            self.conn.command("Fetch.enable", json!({})).await?;
        } else {
            self.conn.command("Fetch.disable", json!({})).await?;
        }
        Ok(())
    }

    async fn set_confirm_handler(&self, handler: Option<ConfirmHandler>) -> Result<()> {
        *self.state.confirm_handler.write() = handler;
        Ok(())
    }

    async fn set_prompt_handler(&self, handler: Option<PromptHandler>) -> Result<()> {
        *self.state.prompt_handler.write() = handler;
        Ok(())
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn is_running(&self) -> bool {
        *self.running.read()
    }
}

impl ChromeEngine {
    /// Launches a Chromium process and connects to it.
    async fn launch(config: EngineConfig) -> Result<Self> {
        let mut child = spawn_browser(&config)?;
        let timeout = Duration::from_millis(config.timeout_ms);

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BrowserError::operation("browser stderr was not captured"))?;
        let browser_ws = match scrape_devtools_endpoint(stderr, timeout).await {
            Ok(ws) => ws,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };

        let endpoint = http_endpoint_from_ws(&browser_ws)?;
        let page_ws = match discover_page_target(&endpoint, timeout).await {
            Ok(ws) => ws,
            Err(e) => {
                let _ = child.start_kill();
                return Err(e);
            }
        };

        // On bootstrap failure the child is dropped, and kill_on_drop
        // reaps the process.
        Self::bootstrap(&page_ws, config, Some(child)).await
    }

    /// Attaches to an already running browser through its DevTools HTTP
    /// endpoint.
    async fn attach(endpoint: &str, config: EngineConfig) -> Result<Self> {
        if config.proxy.is_some() {
            warn!("proxy configuration is ignored when attaching to a running browser");
        }
        let timeout = Duration::from_millis(config.timeout_ms);
        let page_ws = discover_page_target(endpoint.trim_end_matches('/'), timeout).await?;
        Self::bootstrap(&page_ws, config, None).await
    }

    async fn bootstrap(page_ws: &str, config: EngineConfig, child: Option<Child>) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let (conn, event_rx) = CdpConnection::connect(page_ws, timeout).await?;
        let conn = Arc::new(conn);

        conn.enable_domain("Page").await?;
        conn.enable_domain("Runtime").await?;
        conn.enable_domain("Network").await?;

        if config.ignore_certificate_errors {
            if let Err(e) = conn
                .command("Security.setIgnoreCertificateErrors", json!({ "ignore": true }))
                .await
            {
                warn!(error = %e, "could not suppress certificate errors");
            }
        }
        if let Some(agent) = &config.user_agent {
            conn.command(
                "Network.setUserAgentOverride",
                json!({ "userAgent": agent }),
            )
            .await?;
        }

        let state = Arc::new(EngineState::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let dispatch_handle = spawn_dispatch(
            Arc::clone(&conn),
            event_rx,
            Arc::clone(&state),
            events.clone(),
        );

        Ok(Self {
            config,
            conn,
            state,
            events,
            child: Mutex::new(child),
            dispatch_handle,
            running: RwLock::new(true),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if !*self.running.read() {
            return Err(BrowserError::operation("engine is not running"));
        }
        Ok(())
    }
}

impl Drop for ChromeEngine {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
        self.conn.abort();
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
        }
    }
}

// ============================================================================
// Process bootstrap helpers
// ============================================================================

fn spawn_browser(config: &EngineConfig) -> Result<Child> {
    let candidates: Vec<String> = match &config.executable_path {
        Some(path) => vec![path.clone()],
        None => BROWSER_CANDIDATES.iter().map(|s| s.to_string()).collect(),
    };

    let mut args: Vec<String> = vec![
        "--remote-debugging-port=0".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        format!(
            "--window-size={},{}",
            config.window_size.0, config.window_size.1
        ),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(proxy) = &config.proxy {
        args.push(format!("--proxy-server={proxy}"));
    }
    if let Some(dir) = &config.user_data_dir {
        args.push(format!("--user-data-dir={dir}"));
    }
    args.extend(config.args.iter().cloned());
    args.push("about:blank".to_string());

    let mut last_error: Option<std::io::Error> = None;
    for candidate in &candidates {
        match Command::new(candidate)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => {
                info!(browser = candidate.as_str(), "browser process spawned");
                return Ok(child);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                last_error = Some(e);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(BrowserError::operation(format!(
        "no browser executable found (tried {}): {}",
        candidates.join(", "),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Reads the browser's stderr until it announces its DevTools endpoint.
async fn scrape_devtools_endpoint(
    stderr: tokio::process::ChildStderr,
    timeout: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut lines = BufReader::new(stderr).lines();

    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or_else(|| BrowserError::Connection {
                url: "(launch)".to_string(),
                reason: "timed out waiting for the DevTools endpoint announcement".to_string(),
            })?;

        let line = match tokio::time::timeout(remaining, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                return Err(BrowserError::Connection {
                    url: "(launch)".to_string(),
                    reason: "browser exited before announcing its DevTools endpoint".to_string(),
                })
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(BrowserError::Connection {
                    url: "(launch)".to_string(),
                    reason: "timed out waiting for the DevTools endpoint announcement".to_string(),
                })
            }
        };

        trace!(target: "webpilot::chrome", line = line.as_str(), "browser stderr");
        if let Some(caps) = DEVTOOLS_LINE_RE.captures(&line) {
            let ws = caps[1].to_string();
            // Keep draining so the process never blocks on a full pipe.
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(target: "webpilot::chrome", line = line.as_str(), "browser stderr");
                }
            });
            return Ok(ws);
        }
    }
}

fn http_endpoint_from_ws(browser_ws: &str) -> Result<String> {
    let parsed = Url::parse(browser_ws).map_err(|source| BrowserError::InvalidUrl {
        url: browser_ws.to_string(),
        source,
    })?;
    let host = parsed.host_str().unwrap_or("127.0.0.1");
    let port = parsed
        .port()
        .ok_or_else(|| BrowserError::Protocol("DevTools endpoint has no port".to_string()))?;
    Ok(format!("http://{host}:{port}"))
}

/// Finds a page target's WebSocket URL, creating a page if the browser
/// has none yet.
async fn discover_page_target(endpoint: &str, timeout: Duration) -> Result<String> {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + timeout;
    let list_url = format!("{endpoint}/json/list");

    loop {
        match client.get(&list_url).send().await {
            Ok(response) => {
                if let Ok(targets) = response.json::<Value>().await {
                    if let Some(ws) = pick_page_ws(&targets) {
                        return Ok(ws);
                    }
                }
                // No page yet; newer browsers require PUT here.
                let new_url = format!("{endpoint}/json/new?about:blank");
                if let Ok(response) = client.put(&new_url).send().await {
                    if let Ok(target) = response.json::<Value>().await {
                        if let Some(ws) =
                            target.get("webSocketDebuggerUrl").and_then(Value::as_str)
                        {
                            return Ok(ws.to_string());
                        }
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "DevTools endpoint not answering yet");
            }
        }

        if Instant::now() >= deadline {
            return Err(BrowserError::Connection {
                url: endpoint.to_string(),
                reason: "no page target appeared in time".to_string(),
            });
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn pick_page_ws(targets: &Value) -> Option<String> {
    targets.as_array()?.iter().find_map(|target| {
        if target.get("type").and_then(Value::as_str) == Some("page") {
            target
                .get("webSocketDebuggerUrl")
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            None
        }
    })
}

fn cookie_from_json(value: &Value) -> Option<Cookie> {
    let name = value.get("name")?.as_str()?.to_string();
    let cookie_value = value.get("value")?.as_str()?.to_string();
    let session = value
        .get("session")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let expires = value.get("expires").and_then(Value::as_f64).and_then(|e| {
        if session || e <= 0.0 {
            None
        } else {
            Some(e as i64)
        }
    });

    Some(Cookie {
        name,
        value: cookie_value,
        domain: value
            .get("domain")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        path: value
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or("/")
            .to_string(),
        secure: value
            .get("secure")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        http_only: value
            .get("httpOnly")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        expires,
    })
}

// ============================================================================
// Protocol event dispatch
// ============================================================================

fn spawn_dispatch(
    conn: Arc<CdpConnection>,
    mut events_in: mpsc::UnboundedReceiver<CdpEvent>,
    state: Arc<EngineState>,
    events_out: broadcast::Sender<EngineEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events_in.recv().await {
            handle_protocol_event(&conn, &state, &events_out, event).await;
        }
        debug!("protocol event stream ended");
    })
}

async fn handle_protocol_event(
    conn: &CdpConnection,
    state: &EngineState,
    events_out: &broadcast::Sender<EngineEvent>,
    event: CdpEvent,
) {
    match event.method.as_str() {
        "Page.loadEventFired" => {
            let failed = std::mem::take(&mut *state.load_failed.write());
            let url = state.current_url.read().clone();
            info!(
                url = url.as_ref().map(Url::as_str).unwrap_or(""),
                success = !failed,
                "page load finished"
            );
            let _ = events_out.send(EngineEvent::LoadFinished {
                url,
                success: !failed,
            });
        }
        "Page.frameNavigated" => {
            let frame = &event.params["frame"];
            if frame.get("parentId").is_none() {
                if let Some(url) = frame.get("url").and_then(Value::as_str) {
                    *state.current_url.write() = Url::parse(url).ok();
                }
                if frame.get("unreachableUrl").and_then(Value::as_str).is_some() {
                    *state.load_failed.write() = true;
                }
            }
        }
        "Page.navigatedWithinDocument" => {
            if let Some(url) = event.params.get("url").and_then(Value::as_str) {
                *state.current_url.write() = Url::parse(url).ok();
            }
        }
        "Page.javascriptDialogOpening" => {
            handle_dialog(conn, state, events_out, &event.params).await;
        }
        "Runtime.consoleAPICalled" => {
            let message = console_message_from_params(&event.params);
            state.record_console(message, events_out);
        }
        "Fetch.requestPaused" => {
            handle_paused_request(conn, state, events_out, &event.params).await;
        }
        "Network.loadingFailed" => {
            // Reply-level failures stay log-only; navigation outcomes are
            // reported through the load-success flag.
            let (error, resource) = loading_failure_fields(&event.params);
            warn!(error, resource, "request failed");
        }
        "Network.responseReceived" => {
            let (url, status) = response_summary(&event.params);
            debug!(url, status, "reply received");
        }
        _ => {
            trace!(method = event.method.as_str(), "unhandled protocol event");
        }
    }
}

async fn handle_dialog(
    conn: &CdpConnection,
    state: &EngineState,
    events_out: &broadcast::Sender<EngineEvent>,
    params: &Value,
) {
    let kind = params.get("type").and_then(Value::as_str).unwrap_or("");
    let message = params
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let page_url = params
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let (accept, prompt_text) = match kind {
        "alert" => {
            state.record_console(ConsoleMessage::alert(message.clone()), events_out);
            (true, None)
        }
        "confirm" => {
            let handler = state.confirm_handler.read().clone();
            let accept = match handler {
                Some(handler) => handler(&page_url, &message),
                None => false,
            };
            info!(%page_url, message = message.as_str(), accept, "confirm dialog");
            (accept, None)
        }
        "prompt" => {
            let default = params
                .get("defaultPrompt")
                .and_then(Value::as_str)
                .unwrap_or("");
            let handler = state.prompt_handler.read().clone();
            let answer = match handler {
                Some(handler) => handler(&page_url, &message, default),
                None => None,
            };
            info!(
                %page_url,
                message = message.as_str(),
                answered = answer.is_some(),
                "prompt dialog"
            );
            match answer {
                Some(text) => (true, Some(text)),
                None => (false, None),
            }
        }
        // beforeunload: let the navigation proceed.
        _ => (true, None),
    };

    let mut reply = json!({ "accept": accept });
    if let Some(text) = prompt_text {
        reply["promptText"] = Value::String(text);
    }
    if let Err(e) = conn.command("Page.handleJavaScriptDialog", reply).await {
        warn!(error = %e, "could not answer dialog");
    }
}

async fn handle_paused_request(
    conn: &CdpConnection,
    state: &EngineState,
    events_out: &broadcast::Sender<EngineEvent>,
    params: &Value,
) {
    let request_id = params
        .get("requestId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let method = params
        .pointer("/request/method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_string();
    let url_str = params
        .pointer("/request/url")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let resource_type = params
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default();

    debug!(method = method.as_str(), url = url_str, "request");

    let allowed = {
        let filter = state.request_filter.read().clone();
        match (filter, Url::parse(url_str)) {
            (Some(filter), Ok(url)) => filter(&method, &url),
            _ => true,
        }
    };

    if allowed {
        if let Err(e) = conn
            .command("Fetch.continueRequest", json!({ "requestId": request_id }))
            .await
        {
            warn!(error = %e, "could not continue request");
        }
    } else {
        info!(url = url_str, "request vetoed by filter");
        if let Err(e) = conn
            .command(
                "Fetch.failRequest",
                json!({ "requestId": request_id, "errorReason": "Aborted" }),
            )
            .await
        {
            warn!(error = %e, "could not fail request");
        }
        if resource_type == "Document" {
            let _ = events_out.send(EngineEvent::LoadFinished {
                url: Url::parse(url_str).ok(),
                success: false,
            });
        }
    }
}

fn console_message_from_params(params: &Value) -> ConsoleMessage {
    let text = params
        .get("args")
        .and_then(Value::as_array)
        .map(|args| {
            args.iter()
                .map(|arg| match arg.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => arg
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let mut message = ConsoleMessage::console(text);
    if let Some(frame) = params.pointer("/stackTrace/callFrames/0") {
        message.source = frame
            .get("url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        message.line = frame
            .get("lineNumber")
            .and_then(Value::as_u64)
            .map(|n| n as u32);
    }
    message
}

fn loading_failure_fields(params: &Value) -> (&str, &str) {
    let error = params.get("errorText").and_then(Value::as_str).unwrap_or("");
    let resource = params.get("type").and_then(Value::as_str).unwrap_or("");
    (error, resource)
}

fn response_summary(params: &Value) -> (&str, i64) {
    let url = params
        .pointer("/response/url")
        .and_then(Value::as_str)
        .unwrap_or("");
    let status = params
        .pointer("/response/status")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    (url, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::engine::ConsoleKind;

    #[test]
    fn test_devtools_line_regex() {
        let line = "DevTools listening on ws://127.0.0.1:33741/devtools/browser/abc-def";
        let caps = DEVTOOLS_LINE_RE.captures(line).unwrap();
        assert_eq!(&caps[1], "ws://127.0.0.1:33741/devtools/browser/abc-def");

        assert!(DEVTOOLS_LINE_RE
            .captures("[0822/120000:ERROR:gpu_init.cc] something else")
            .is_none());
    }

    #[test]
    fn test_http_endpoint_from_ws() {
        let endpoint =
            http_endpoint_from_ws("ws://127.0.0.1:9222/devtools/browser/abc").unwrap();
        assert_eq!(endpoint, "http://127.0.0.1:9222");
    }

    #[test]
    fn test_pick_page_ws_prefers_page_targets() {
        let targets = json!([
            { "type": "background_page", "webSocketDebuggerUrl": "ws://x/1" },
            { "type": "page", "webSocketDebuggerUrl": "ws://x/2" },
        ]);
        assert_eq!(pick_page_ws(&targets).as_deref(), Some("ws://x/2"));
        assert_eq!(pick_page_ws(&json!([])), None);
    }

    #[test]
    fn test_cookie_from_json_maps_session_to_none() {
        let value = json!({
            "name": "sid", "value": "abc", "domain": ".example.org", "path": "/",
            "expires": -1.0, "size": 6, "httpOnly": true, "secure": true, "session": true
        });
        let cookie = cookie_from_json(&value).unwrap();
        assert_eq!(cookie.name, "sid");
        assert!(cookie.expires.is_none());
        assert!(cookie.http_only);
        assert!(cookie.secure);

        let value = json!({
            "name": "keep", "value": "1", "domain": "example.org", "path": "/",
            "expires": 4102444800.0, "session": false
        });
        let cookie = cookie_from_json(&value).unwrap();
        assert_eq!(cookie.expires, Some(4_102_444_800));
    }

    #[test]
    fn test_network_event_fields_tolerate_missing_keys() {
        let params = json!({
            "errorText": "net::ERR_CONNECTION_REFUSED",
            "type": "Document"
        });
        assert_eq!(
            loading_failure_fields(&params),
            ("net::ERR_CONNECTION_REFUSED", "Document")
        );
        assert_eq!(loading_failure_fields(&json!({})), ("", ""));

        let params = json!({
            "response": { "url": "http://example.org/app.js", "status": 404 }
        });
        assert_eq!(response_summary(&params), ("http://example.org/app.js", 404));
        assert_eq!(response_summary(&json!({})), ("", 0));
    }

    #[test]
    fn test_console_message_from_params_joins_args() {
        let params = json!({
            "type": "log",
            "args": [
                { "type": "string", "value": "hello" },
                { "type": "number", "value": 42 },
            ],
            "stackTrace": {
                "callFrames": [
                    { "url": "http://example.org/app.js", "lineNumber": 12 }
                ]
            }
        });
        let message = console_message_from_params(&params);
        assert_eq!(message.kind, ConsoleKind::Console);
        assert_eq!(message.message, "hello 42");
        assert_eq!(message.source.as_deref(), Some("http://example.org/app.js"));
        assert_eq!(message.line, Some(12));
    }
}
