//! Newsletter text cleanup.
//!
//! Newsletters carry tracking links, navigation blurbs and layout debris that
//! only cost tokens. Plain-text bodies go through [`clean_text`]; HTML bodies
//! are first flattened by [`html_to_text`].

use regex::{Captures, Regex};
use std::sync::LazyLock;

static PAREN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(https?://[^\s)]+\)").expect("valid regex"));
static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
static NAVIGATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:view in browser|subscribe|unsubscribe|submit a tip|manage preferences|click here).*?\n|\[.*?\]",
    )
    .expect("valid regex")
});
static SYMBOL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[()\[\]{}\-=+*\s]+$").expect("valid regex"));
static EXTRA_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static EXTRA_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));
static TABS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\t+").expect("valid regex"));

static DROPPED_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>|<noscript\b.*?</noscript\s*>|<iframe\b.*?</iframe\s*>|<svg\b.*?</svg\s*>",
    )
    .expect("valid regex")
});
static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a\s*>").expect("valid regex"));
static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:b|i|u|em|strong|span|font|small|sup|sub)\b[^>]*>").expect("valid regex")
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Words that mark a short line as navigation.
const NAVIGATION_WORDS: &[&str] = &[
    "view",
    "browser",
    "subscribe",
    "unsubscribe",
    "click",
    "here",
    "manage",
    "preferences",
    "tip",
];

const SHORT_LINE: usize = 20;

pub fn clean_text(text: &str) -> String {
    let text = html_escape::decode_html_entities(text);
    let text = PAREN_URL.replace_all(&text, "");
    let text = BARE_URL.replace_all(&text, "");
    let text = NAVIGATION.replace_all(&text, "");

    let mut lines: Vec<&str> = Vec::new();
    let mut prev_empty = false;

    for line in text.lines() {
        let line = line.trim();

        if line.is_empty() {
            if !prev_empty && !lines.is_empty() {
                lines.push("");
                prev_empty = true;
            }
            continue;
        }
        prev_empty = false;

        if line.chars().count() < SHORT_LINE {
            let lower = line.to_lowercase();
            if NAVIGATION_WORDS.iter().any(|word| lower.contains(word)) {
                continue;
            }
        }

        if SYMBOL_LINE.is_match(line) {
            continue;
        }

        lines.push(line);
    }

    let result = lines.join("\n");
    let result = EXTRA_NEWLINES.replace_all(&result, "\n\n");
    let result = EXTRA_SPACES.replace_all(&result, " ");
    let result = TABS.replace_all(&result, " ");
    result.trim().to_string()
}

/// Flatten an HTML body to text, then clean it.
pub fn html_to_text(html: &str) -> String {
    let text = DROPPED_ELEMENTS.replace_all(html, "");
    let text = ANCHOR.replace_all(&text, |caps: &Captures| {
        let inner = ANY_TAG.replace_all(&caps[1], "");
        let label = html_escape::decode_html_entities(inner.trim()).into_owned();
        if label.chars().count() > 3 && !label.starts_with("http") && !label.starts_with("www") {
            format!("{} ", label)
        } else {
            String::new()
        }
    });
    let text = INLINE_TAG.replace_all(&text, "");
    let text = ANY_TAG.replace_all(&text, "\n");
    clean_text(&text)
}
