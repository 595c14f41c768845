//! Visible-text extraction for fetched quiz pages.
//!
//! Quiz pages often render their question from an inline `atob("...")`
//! payload, so those payloads are decoded and appended to the page text.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use scraper::{ElementRef, Html};

static ATOB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"atob\(\s*[`'"]([A-Za-z0-9+/=\s]+)[`'"]\s*\)"#).expect("atob regex")
});

/// Elements whose text never reaches the rendered page.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Visible text of `html`, truncated to `max_chars` characters.
pub fn visible_text(html: &str, max_chars: usize) -> String {
    let mut lines = text_lines(&Html::parse_document(html));
    for payload in decode_atob_payloads(html) {
        lines.extend(text_lines(&Html::parse_fragment(&payload)));
    }
    truncate_chars(&lines.join("\n"), max_chars)
}

/// Decode every `atob("...")` literal that holds valid base64 text.
pub fn decode_atob_payloads(html: &str) -> Vec<String> {
    ATOB_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let compact: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD.decode(compact).ok()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        })
        .collect()
}

/// Trimmed, non-empty lines of every rendered text node, in document order.
/// Entities are already decoded by the parser.
fn text_lines(document: &Html) -> Vec<String> {
    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| HIDDEN_ELEMENTS.contains(&el.value().name()));
            (!hidden).then_some(&**text)
        })
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
