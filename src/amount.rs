// src/amount.rs
//! Numeral normalization: separators, negative markers, decimal truncation, unit scaling.

use crate::model::UnitMultiplier;

const NEGATIVE_MARKERS: [char; 4] = ['-', '−', '△', '▲'];
const OPEN_PARENS: [char; 2] = ['(', '（'];

/// Converts a captured numeral into a signed amount in base currency units.
///
/// `(1,234)`, `-1,234`, `△1,234` and `▲1,234` are negative. Any decimal part is
/// truncated before the unit is applied. Returns `None` when nothing numeric
/// remains (e.g. `-` placeholders or footnote-only captures) or on overflow.
pub fn normalize_amount(raw: &str, unit: UnitMultiplier) -> Option<i64> {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars().filter(|c| !c.is_whitespace()).peekable();

    let mut negative = false;
    while let Some(&c) = chars.peek() {
        if OPEN_PARENS.contains(&c) || NEGATIVE_MARKERS.contains(&c) {
            negative = true;
            chars.next();
        } else {
            break;
        }
    }

    let mut digits = String::new();
    for c in chars {
        match c {
            '0'..='9' => digits.push(c),
            ',' => {}
            '.' => break, // truncate the fractional part
            _ => {}
        }
    }
    if digits.is_empty() {
        return None;
    }

    let magnitude: i64 = digits.parse().ok()?;
    let scaled = magnitude.checked_mul(unit.factor())?;
    Some(if negative { -scaled } else { scaled })
}
