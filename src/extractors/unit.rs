// src/extractors/unit.rs
//! Unit declaration detection ("(단위 : 백만원)" and friends).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::UnitMultiplier;

// Checked most specific first: "원" alone is a substring of every other unit name,
// and English "million" is a substring of "hundred million".
static UNIT_TEXT_RE: Lazy<Vec<(UnitMultiplier, Regex)>> = Lazy::new(|| {
    [
        (
            UnitMultiplier::HundredMillion,
            r"(?i)단\s*위\s*[:：]?\s*억\s*원|in\s+hundreds?\s+(?:of\s+)?millions?|unit\s*[:：]\s*hundred[\s\-]?millions?",
        ),
        (
            UnitMultiplier::Million,
            r"(?i)단\s*위\s*[:：]?\s*백\s*만\s*원|in\s+millions?\b|unit\s*[:：]\s*millions?",
        ),
        (
            UnitMultiplier::Thousand,
            r"(?i)단\s*위\s*[:：]?\s*천\s*원|in\s+thousands?\b|unit\s*[:：]\s*thousands?",
        ),
        (
            UnitMultiplier::Base,
            r"(?i)단\s*위\s*[:：]?\s*원|in\s+(?:korean\s+)?won\b|unit\s*[:：]\s*(?:currency[\s\-]?base|won|krw)\b",
        ),
    ]
    .into_iter()
    .map(|(unit, pat)| (unit, Regex::new(pat).expect("Failed to compile unit pattern")))
    .collect()
});

static AUNIT_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<[^>]*\bAUNIT\s*=\s*"([^"]*)"[^>]*>"#).expect("Failed to compile AUNIT_TAG_RE")
});

static AUNITVALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bAUNITVALUE\s*=\s*"\s*([0-9]+)\s*""#).expect("Failed to compile AUNITVALUE_RE")
});

/// Returns the multiplier declared in `text`, or `None` if nothing is declared.
///
/// Precedence: hundred-million > million > thousand > base-currency text
/// declarations, then the `AUNIT`/`AUNITVALUE` attribute pair.
pub fn detect_unit_signal(text: &str) -> Option<UnitMultiplier> {
    for (unit, re) in UNIT_TEXT_RE.iter() {
        if re.is_match(text) {
            tracing::trace!("Unit declaration matched {:?}", unit);
            return Some(*unit);
        }
    }
    detect_unit_attribute(text)
}

/// Multiplier for `text`, defaulting to base units.
pub fn detect_unit(text: &str) -> UnitMultiplier {
    detect_unit_signal(text).unwrap_or_default()
}

fn detect_unit_attribute(text: &str) -> Option<UnitMultiplier> {
    for caps in AUNIT_TAG_RE.captures_iter(text) {
        let tag = caps.get(0).map_or("", |m| m.as_str());
        let code = caps.get(1).map_or("", |m| m.as_str());

        let from_value = AUNITVALUE_RE
            .captures(tag)
            .and_then(|v| v.get(1))
            .and_then(|v| v.as_str().parse::<u64>().ok())
            .and_then(unit_from_value);
        if let Some(unit) = from_value.or_else(|| unit_from_code(code)) {
            tracing::trace!("Unit attribute AUNIT=\"{}\" resolved to {:?}", code, unit);
            return Some(unit);
        }
    }
    None
}

/// AUNITVALUE carries either a power of ten or the factor itself.
fn unit_from_value(value: u64) -> Option<UnitMultiplier> {
    match value {
        0 | 1 => Some(UnitMultiplier::Base),
        3 | 1_000 => Some(UnitMultiplier::Thousand),
        6 | 1_000_000 => Some(UnitMultiplier::Million),
        8 | 100_000_000 => Some(UnitMultiplier::HundredMillion),
        _ => None,
    }
}

fn unit_from_code(code: &str) -> Option<UnitMultiplier> {
    let code = code.to_uppercase();
    if code.contains('억') || code.contains("HUNDRED_MILLION") {
        Some(UnitMultiplier::HundredMillion)
    } else if code.contains("백만") || code.contains("MILLION") {
        Some(UnitMultiplier::Million)
    } else if code.contains('천') || code.contains("THOUSAND") {
        Some(UnitMultiplier::Thousand)
    } else if code.contains('원') || code.contains("KRW") || code.contains("WON") {
        Some(UnitMultiplier::Base)
    } else {
        None
    }
}
