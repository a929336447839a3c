//! Current-page state tracking.
//!
//! A browser session drives exactly one page at a time. [`PageState`]
//! records where that page stands: which URL it points at, whether a
//! navigation is in flight, and when the state last changed. Sessions keep
//! one instance each, so state never leaks between sessions.

use chrono::{DateTime, Utc};
use url::Url;
use uuid::Uuid;

/// Lifecycle of the page a session currently drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    /// No navigation has happened yet.
    Idle,
    /// A navigation is in flight.
    Loading,
    /// The last navigation completed successfully.
    Ready,
    /// The last navigation finished unsuccessfully.
    Failed(String),
}

impl Default for PageStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageStatus::Idle => write!(f, "Idle"),
            PageStatus::Loading => write!(f, "Loading"),
            PageStatus::Ready => write!(f, "Ready"),
            PageStatus::Failed(msg) => write!(f, "Failed: {}", msg),
        }
    }
}

/// State of the page a session currently points at.
#[derive(Debug, Clone)]
pub struct PageState {
    /// Identifier of the owning session.
    pub session_id: Uuid,

    /// URL of the current page, if any navigation has happened.
    pub url: Option<Url>,

    /// Current lifecycle status.
    pub status: PageStatus,

    /// Timestamp when this state was created.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the last status change.
    pub last_updated: DateTime<Utc>,
}

impl PageState {
    /// Creates a fresh idle page state for the given session.
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            url: None,
            status: PageStatus::Idle,
            created_at: now,
            last_updated: now,
        }
    }

    /// Marks a navigation to `url` as started.
    pub fn begin_navigation(&mut self, url: Url) {
        self.url = Some(url);
        self.status = PageStatus::Loading;
        self.last_updated = Utc::now();
    }

    /// Records the outcome of the navigation in flight.
    ///
    /// `final_url` overrides the recorded URL when the engine reports a
    /// different landing address (redirects, script navigation).
    pub fn complete_navigation(&mut self, success: bool, final_url: Option<Url>) {
        if let Some(url) = final_url {
            self.url = Some(url);
        }
        self.status = if success {
            PageStatus::Ready
        } else {
            PageStatus::Failed("load reported failure".to_string())
        };
        self.last_updated = Utc::now();
    }

    /// Records a navigation failure with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = PageStatus::Failed(reason.into());
        self.last_updated = Utc::now();
    }

    /// True once a navigation has completed successfully.
    pub fn is_ready(&self) -> bool {
        matches!(self.status, PageStatus::Ready)
    }

    /// True while a navigation is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self.status, PageStatus::Loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = PageState::new(Uuid::new_v4());
        assert_eq!(state.status, PageStatus::Idle);
        assert!(state.url.is_none());
        assert!(!state.is_ready());
    }

    #[test]
    fn test_navigation_transitions() {
        let mut state = PageState::new(Uuid::new_v4());

        state.begin_navigation(url("http://example.org/a"));
        assert!(state.is_loading());
        assert_eq!(state.url.as_ref().map(Url::as_str), Some("http://example.org/a"));

        state.complete_navigation(true, None);
        assert!(state.is_ready());
    }

    #[test]
    fn test_failed_navigation_keeps_reason() {
        let mut state = PageState::new(Uuid::new_v4());
        state.begin_navigation(url("wrong://nope"));
        state.complete_navigation(false, None);

        assert!(matches!(state.status, PageStatus::Failed(_)));
        assert!(state.status.to_string().starts_with("Failed"));
    }

    #[test]
    fn test_final_url_overrides_requested() {
        let mut state = PageState::new(Uuid::new_v4());
        state.begin_navigation(url("http://example.org/start"));
        state.complete_navigation(true, Some(url("http://example.org/landed")));

        assert_eq!(
            state.url.as_ref().map(Url::as_str),
            Some("http://example.org/landed")
        );
    }

    #[test]
    fn test_updates_touch_timestamp() {
        let mut state = PageState::new(Uuid::new_v4());
        let before = state.last_updated;
        state.begin_navigation(url("http://example.org/"));
        assert!(state.last_updated >= before);
    }
}
