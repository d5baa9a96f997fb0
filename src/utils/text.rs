// src/utils/text.rs
//! Markup flattening and the spacing-tolerant literal matching shared by the
//! locator and the extractors.

use once_cell::sync::Lazy;
use regex::Regex;

/// Whitespace (including entity-encoded non-breaking spaces) allowed between
/// the characters of a spaced-out title or label.
pub const SPACING: &str = r"(?:\s|&nbsp;|&#160;)*";

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Failed to compile TAG_RE"));

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WS_RE"));

// Ordinal prefixes such as "Ⅰ.", "IV.", "1.", "2-1.", "(1)", "가.", "①".
static ORDINAL_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:[0-9]+(?:-[0-9]+)*|[IVXivx]+|[Ⅰ-Ⅻ]+|[가나다라마바사아자차카타파하])[\.\)]|\(\s*(?:[0-9]+|[가나다라마바사아자차카타파하]|[IVXivx]+)\s*\)|[①-⑳])\s*",
    )
    .expect("Failed to compile ORDINAL_PREFIX_RE")
});

/// Builds a regex fragment matching `literal` with optional whitespace between
/// every pair of characters ("재무상태표" also matches "재 무 상 태 표").
pub fn spaced_pattern(literal: &str) -> String {
    literal
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| regex::escape(&c.to_string()))
        .collect::<Vec<_>>()
        .join(SPACING)
}

/// Strips tags, decodes entities and collapses whitespace runs into single spaces.
pub fn flatten_markup(markup: &str) -> String {
    let without_tags = TAG_RE.replace_all(markup, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    WS_RE.replace_all(&decoded, " ").trim().to_string()
}

/// Collapses whitespace runs and trims.
pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Removes all whitespace; table cells and headings are often spaced out character by character.
pub fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Drops a leading ordinal / roman-numeral / bullet prefix.
pub fn strip_ordinal_prefix(text: &str) -> &str {
    match ORDINAL_PREFIX_RE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Whether `c` is a precomposed Hangul syllable.
pub fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Largest char boundary at or below `idx`.
pub fn floor_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Slice of at most `max_bytes` bytes from the start of `text`, cut on a char boundary.
pub fn head(text: &str, max_bytes: usize) -> &str {
    &text[..floor_boundary(text, max_bytes)]
}
