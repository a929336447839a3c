//! Cookie snapshot type and the plain-text cookie export.
//!
//! Engines surface their cookie jar as a list of [`Cookie`] values. The
//! export format is the classic Netscape/Mozilla `cookies.txt` layout: a
//! fixed header comment followed by one tab-separated line per persistent
//! cookie. Session cookies (no expiration) are excluded from the export.

use serde::{Deserialize, Serialize};
use url::Url;

/// Header line opening every cookie export.
pub const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";

/// A single cookie as reported by a render engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,

    /// Cookie value.
    pub value: String,

    /// Domain the cookie applies to. A leading dot marks a domain cookie
    /// valid for subdomains.
    pub domain: String,

    /// Path the cookie applies to.
    #[serde(default = "default_path")]
    pub path: String,

    /// Whether the cookie is restricted to secure transports.
    #[serde(default)]
    pub secure: bool,

    /// Whether the cookie is hidden from script access.
    #[serde(default)]
    pub http_only: bool,

    /// Expiration as a Unix epoch in seconds. `None` marks a session
    /// cookie, which lives only as long as the browser instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    /// Creates a session cookie with the given name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: default_path(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    /// Sets the cookie domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets the cookie path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Marks the cookie secure.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the expiration epoch, turning this into a persistent cookie.
    pub fn with_expires(mut self, epoch_seconds: i64) -> Self {
        self.expires = Some(epoch_seconds);
        self
    }

    /// True for cookies that vanish when the browser session ends.
    pub fn is_session(&self) -> bool {
        self.expires.is_none()
    }

    /// Whether this cookie should be sent on a request to `url`.
    ///
    /// Domain cookies (leading dot) match the bare domain and any
    /// subdomain; host cookies match exactly. The request path must sit
    /// under the cookie path, and secure cookies only travel over https.
    pub fn matches_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        let domain_ok = if let Some(bare) = self.domain.strip_prefix('.') {
            host == bare || host.ends_with(&self.domain)
        } else {
            host == self.domain
        };
        if !domain_ok {
            return false;
        }

        if !url.path().starts_with(&self.path) {
            return false;
        }

        if self.secure && url.scheme() != "https" {
            return false;
        }

        true
    }

    /// Renders the cookie as one export line, or `None` for session
    /// cookies, which the format omits.
    pub fn netscape_line(&self) -> Option<String> {
        let expires = self.expires?;
        let domain_flag = self.domain.starts_with('.');
        Some(
            [
                self.domain.as_str(),
                bool_flag(domain_flag),
                self.path.as_str(),
                bool_flag(self.secure),
                &expires.to_string(),
                self.name.as_str(),
                self.value.as_str(),
            ]
            .join("\t"),
        )
    }
}

fn bool_flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Serializes cookies into the Netscape plain-text format.
///
/// The result starts with [`NETSCAPE_HEADER`] and contains one line per
/// persistent cookie, in input order. Session cookies are skipped.
pub fn to_netscape(cookies: &[Cookie]) -> String {
    let mut lines = vec![NETSCAPE_HEADER.to_string()];
    lines.extend(cookies.iter().filter_map(Cookie::netscape_line));
    lines.join("\n")
}

/// Builds a `Cookie:` request-header value from the cookies applicable
/// to `url`, preserving jar order.
pub fn header_for_url(cookies: &[Cookie], url: &Url) -> Option<String> {
    let pairs: Vec<String> = cookies
        .iter()
        .filter(|c| c.matches_url(url))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
