//! Selector-operation script snippets.
//!
//! DOM manipulation is expressed as small JavaScript snippets generated
//! from a CSS selector and evaluated in the page. Every snippet resolves
//! to the number of elements it touched, which lets the session layer
//! detect selectors that matched nothing.
//!
//! The module owns both directions of the grammar: [`click`], [`fill`]
//! and friends build snippets, while `parse_snippet` recognizes them
//! again. The scripted engine used in tests interprets operations through
//! the parser, so builders and interpretation cannot drift apart.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Quotes `s` as a JavaScript string literal.
///
/// JSON string syntax is a subset of JavaScript's, so serializing through
/// [`serde_json`] yields a literal that is safe to splice into a snippet
/// regardless of quotes, backslashes, or control characters in the input.
pub fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn for_each(selector: &str, body: &str) -> String {
    format!(
        "(() => {{ const m = document.querySelectorAll({}); for (const el of m) {{ {} }} return m.length; }})()",
        js_string(selector),
        body
    )
}

/// Snippet dispatching a click on every element matching `selector`.
pub fn click(selector: &str) -> String {
    for_each(selector, "el.click();")
}

/// Snippet setting the checked property on every match.
pub fn set_checked(selector: &str, checked: bool) -> String {
    let body = if checked {
        "el.checked = true;"
    } else {
        "el.checked = false;"
    };
    for_each(selector, body)
}

/// Snippet marking matched option elements selected and notifying their
/// enclosing select.
pub fn select_option(selector: &str) -> String {
    for_each(
        selector,
        "el.selected = true; const s = el.closest('select'); if (s) { s.dispatchEvent(new Event('change', { bubbles: true })); }",
    )
}

/// Snippet assigning `value` to the value property of every match.
pub fn fill(selector: &str, value: &str) -> String {
    for_each(selector, &format!("el.value = {};", js_string(value)))
}

/// Extracts the match count from a snippet's evaluation result.
pub fn match_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
}

/// A recognized selector operation, recovered from snippet text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SnippetOp {
    Click { selector: String },
    SetChecked { selector: String, checked: bool },
    SelectOption { selector: String },
    Fill { selector: String, value: String },
}

const LITERAL: &str = r#""(?:[^"\\]|\\.)*""#;

static CLICK_RE: Lazy<Regex> = Lazy::new(|| snippet_re("el\\.click\\(\\);"));
static CHECK_RE: Lazy<Regex> = Lazy::new(|| snippet_re("el\\.checked = (?P<flag>true|false);"));
static SELECT_RE: Lazy<Regex> = Lazy::new(|| snippet_re("el\\.selected = true;.*"));
static FILL_RE: Lazy<Regex> =
    Lazy::new(|| snippet_re(&format!("el\\.value = (?P<value>{LITERAL});")));

fn snippet_re(body: &str) -> Regex {
    let pattern = format!(
        r#"^\(\(\) => \{{ const m = document\.querySelectorAll\((?P<sel>{LITERAL})\); for \(const el of m\) \{{ {body} \}} return m\.length; \}}\)\(\)$"#
    );
    Regex::new(&pattern).unwrap()
}

fn unquote(literal: &str) -> Option<String> {
    serde_json::from_str(literal).ok()
}

/// Recognizes a snippet produced by this module, if `script` is one.
pub(crate) fn parse_snippet(script: &str) -> Option<SnippetOp> {
    if let Some(caps) = CLICK_RE.captures(script) {
        return Some(SnippetOp::Click {
            selector: unquote(&caps["sel"])?,
        });
    }
    if let Some(caps) = CHECK_RE.captures(script) {
        return Some(SnippetOp::SetChecked {
            selector: unquote(&caps["sel"])?,
            checked: &caps["flag"] == "true",
        });
    }
    if let Some(caps) = SELECT_RE.captures(script) {
        return Some(SnippetOp::SelectOption {
            selector: unquote(&caps["sel"])?,
        });
    }
    if let Some(caps) = FILL_RE.captures(script) {
        return Some(SnippetOp::Fill {
            selector: unquote(&caps["sel"])?,
            value: unquote(&caps["value"])?,
        });
    }
    None
}
