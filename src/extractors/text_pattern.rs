// src/extractors/text_pattern.rs
//! Primary strategy: ordered label aliases matched against a section's flattened text.

use regex::Regex;

use crate::amount::normalize_amount;
use crate::dictionary::AccountDictionary;
use crate::model::{Diagnostic, ExtractedField, StatementKind, Strategy, UnitMultiplier};
use crate::utils::text::{is_hangul_syllable, spaced_pattern};

// Footnote markers that may sit between a label and its amount:
// "(주1)", "(주석 3,4)", "(*2)", "*3", "주5", or a bare note column like "5,6 ".
const FOOTNOTE: &str = r"(?:\(\s*주\s*석?\s*[0-9,\.\s\-~]*\)|\(\s*\*\s*[0-9]*\s*\)|\*[0-9]+|주\s*석?\s*[0-9]+(?:\s*,\s*[0-9]+)*|[0-9]{1,2}(?:\s*,\s*[0-9]{1,2})*\s)";

// Comma-grouped with at least one thousands group, or seven or more bare digits.
const NUMERAL: &str = r"(?P<num>[\(（]?\s*[-−△▲]?\s*(?:[0-9]{1,3}(?:,[0-9]{3})+|[0-9]{7,})(?:\.[0-9]+)?\s*[\)）]?)";

/// Compiles the capture pattern for one alias: spaced label, optional footnotes, first numeral.
pub fn alias_regex(alias: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"{}\s*(?:{}\s*)*{}",
        spaced_pattern(alias),
        FOOTNOTE,
        NUMERAL
    ))
}

/// First numeral captured by `pattern` whose label is not glued to a preceding
/// Hangul syllable (so "유동자산" never matches inside "비유동자산").
pub fn find_numeral<'t>(pattern: &Regex, text: &'t str) -> Option<&'t str> {
    let mut pos = 0;
    while pos <= text.len() {
        let caps = pattern.captures_at(text, pos)?;
        let whole = caps.get(0)?;
        let glued = text[..whole.start()]
            .chars()
            .next_back()
            .map_or(false, is_hangul_syllable);
        if !glued {
            return caps.name("num").map(|m| m.as_str());
        }
        tracing::trace!("Rejected label match glued to preceding syllable at {}", whole.start());
        // advance one char past the rejected start
        pos = whole.start()
            + text[whole.start()..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    None
}

/// Resolves every field of `kind` it can from `flat` (markup already stripped).
/// For each field the first alias yielding a parseable numeral wins; a resolved
/// field is never retried with later aliases.
pub fn extract_text_fields(
    flat: &str,
    dictionary: &AccountDictionary,
    kind: StatementKind,
    unit: UnitMultiplier,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ExtractedField> {
    let mut found = Vec::new();

    for field in dictionary.fields_for(kind) {
        for alias in &field.aliases {
            let Some(raw) = find_numeral(&alias.pattern, flat) else {
                continue;
            };
            match normalize_amount(raw, unit) {
                Some(value) => {
                    tracing::debug!(
                        "{}: '{}' -> {} ({}, unit {:?})",
                        field.name,
                        alias.text,
                        value,
                        raw.trim(),
                        unit
                    );
                    found.push(ExtractedField {
                        field: field.name.clone(),
                        value,
                        strategy: Strategy::TextPattern,
                        origin: Some(kind),
                    });
                    break;
                }
                None => {
                    tracing::debug!("{}: unparseable numeral '{}' for alias '{}'", field.name, raw, alias.text);
                    diagnostics.push(Diagnostic::UnparseableNumeral {
                        field: field.name.clone(),
                        raw: raw.trim().to_string(),
                    });
                }
            }
        }
    }

    tracing::info!("Text pattern pass resolved {} {} fields", found.len(), kind);
    found
}
