// src/extractors/structured.rs
//! Secondary strategy: machine-readable `ACODE` / `ACONTEXT` tagged values.
//!
//! Lower confidence than the text pass (a tag does not guarantee the
//! consolidation type as reliably as a title near the numbers), so results are
//! only ever used to fill gaps.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::amount::normalize_amount;
use crate::dictionary::AccountDictionary;
use crate::model::{ConsolidationType, Diagnostic, ExtractedField, StatementKind, Strategy, UnitMultiplier};
use crate::utils::text::{flatten_markup, floor_boundary};

// Tagged elements rarely hold more than a formatted number; anything longer is malformed.
const MAX_ELEMENT_BYTES: usize = 4_096;

static OPEN_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<([A-Za-z][A-Za-z0-9_\-]*)(\s[^>]*\bACODE\s*=[^>]*)>").expect("Failed to compile OPEN_TAG_RE")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_\-]*)\s*=\s*"([^"]*)""#).expect("Failed to compile ATTR_RE")
});

static CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(BPFY|PFY|CFY)([0-9]{4})").expect("Failed to compile CONTEXT_RE"));

static CONTEXT_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bACONTEXT\s*=\s*"CFY([0-9]{4})"#).expect("Failed to compile CONTEXT_ATTR_RE")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOffset {
    Current,
    Prior,
    TwoYearsPrior,
}

/// Parsed `ACONTEXT` value, e.g. `PFY2022eFY_ifrs-full_SeparateMember`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextTag {
    pub offset: PeriodOffset,
    pub year: i32,
    pub consolidation: ConsolidationType,
}

/// Contexts without an explicit member are read as consolidated.
pub fn parse_context(context: &str) -> Option<ContextTag> {
    let caps = CONTEXT_RE.captures(context.trim())?;
    let offset = match caps.get(1)?.as_str() {
        "CFY" => PeriodOffset::Current,
        "PFY" => PeriodOffset::Prior,
        _ => PeriodOffset::TwoYearsPrior,
    };
    let year = caps.get(2)?.as_str().parse().ok()?;
    let consolidation = if context.contains("SeparateMember") {
        ConsolidationType::Separate
    } else {
        ConsolidationType::Consolidated
    };
    Some(ContextTag {
        offset,
        year,
        consolidation,
    })
}

/// Offset a context must carry to report `fiscal_year` in a document whose
/// current period is `document_year`. `None` beyond two years back.
pub fn expected_offset(document_year: i32, fiscal_year: i32) -> Option<PeriodOffset> {
    match document_year - fiscal_year {
        0 => Some(PeriodOffset::Current),
        1 => Some(PeriodOffset::Prior),
        2 => Some(PeriodOffset::TwoYearsPrior),
        _ => None,
    }
}

/// Year of the first current-period context in the document, if any.
pub fn first_current_year(text: &str) -> Option<i32> {
    CONTEXT_ATTR_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|y| y.as_str().parse().ok())
}

/// Scans the whole document for tagged values of `fiscal_year` / `consolidation`.
/// When the document's own year is known, a context must also carry the
/// matching period offset, so a `PFY2023` comparative never stands in for a
/// `CFY2023` figure. The first matching element per field wins; later repeats
/// are ignored. Units come from the statement each field belongs to,
/// defaulting to base units.
pub fn extract_structured_fields(
    text: &str,
    dictionary: &AccountDictionary,
    fiscal_year: i32,
    document_year: Option<i32>,
    consolidation: ConsolidationType,
    units: &BTreeMap<StatementKind, UnitMultiplier>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ExtractedField> {
    let offset = match document_year {
        Some(year) => match expected_offset(year, fiscal_year) {
            Some(offset) => Some(offset),
            None => {
                tracing::debug!("{} is not among the periods of a {} document", fiscal_year, year);
                return Vec::new();
            }
        },
        None => None,
    };
    let mut found = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for caps in OPEN_TAG_RE.captures_iter(text) {
        let (Some(whole), Some(tag), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let attrs: BTreeMap<&str, &str> = ATTR_RE
            .captures_iter(attrs.as_str())
            .filter_map(|a| Some((a.get(1)?.as_str(), a.get(2)?.as_str())))
            .collect();
        let (Some(code), Some(context)) = (attrs.get("ACODE"), attrs.get("ACONTEXT")) else {
            continue;
        };
        let Some(field) = dictionary.field_for_code(code.trim()) else {
            continue;
        };
        if seen.contains(field) {
            continue;
        }
        let Some(ctx) = parse_context(context) else {
            tracing::trace!("Unrecognised context '{}' on {}", context, code);
            continue;
        };
        if ctx.year != fiscal_year || ctx.consolidation != consolidation {
            continue;
        }
        if offset.is_some_and(|o| o != ctx.offset) {
            tracing::trace!("{} context {} has the wrong period offset", code, context);
            continue;
        }
        let Some(content) = element_content(text, whole.end(), tag.as_str()) else {
            continue;
        };

        let raw = flatten_markup(content);
        let kind = dictionary.statement_of(field);
        let unit = kind.and_then(|k| units.get(&k).copied()).unwrap_or_default();
        match normalize_amount(&raw, unit) {
            Some(value) => {
                tracing::debug!("{}: {} -> {} ({:?}, {:?})", field, code, value, ctx.offset, unit);
                seen.insert(field.to_string());
                found.push(ExtractedField {
                    field: field.to_string(),
                    value,
                    strategy: Strategy::StructuredCode,
                    origin: kind,
                });
            }
            None if raw.chars().any(|c| c.is_ascii_digit()) => {
                diagnostics.push(Diagnostic::UnparseableNumeral {
                    field: field.to_string(),
                    raw,
                });
            }
            None => {}
        }
    }

    tracing::info!(
        "Structured code pass found {} fields for {} {}",
        found.len(),
        consolidation,
        fiscal_year
    );
    found
}

/// Text between an opening tag ending at `from` and its closing `</tag`.
fn element_content<'t>(text: &'t str, from: usize, tag: &str) -> Option<&'t str> {
    let window = &text[from..floor_boundary(text, from + MAX_ELEMENT_BYTES)];
    let mut offset = 0;
    while let Some(i) = window[offset..].find("</") {
        let at = offset + i;
        let matches_tag = window[at + 2..]
            .get(..tag.len())
            .map_or(false, |name| name.eq_ignore_ascii_case(tag));
        if matches_tag {
            return Some(&window[..at]);
        }
        offset = at + 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> AccountDictionary {
        AccountDictionary::builtin().unwrap()
    }

    const TAGGED: &str = r#"
<TABLE>
<TR><TE ACODE="ifrs-full_Assets" ACONTEXT="CFY2023eFY">1,500</TE>
<TE ACODE="ifrs-full_Assets" ACONTEXT="PFY2022eFY">1,400</TE></TR>
<TR><TE ACONTEXT="CFY2023eFY_ifrs-full_ConsolidatedAndSeparateFinancialStatementsAxis_ifrs-full_SeparateMember" ACODE="ifrs-full_Assets"><P>900</P></TE></TR>
<TR><TE ACODE="ifrs-full_Revenue" ACONTEXT="CFY2023dFY">(200)</TE></TR>
<TR><TE ACODE="ifrs-full_Revenue" ACONTEXT="CFY2023dFY">999</TE></TR>
<TR><TE ACODE="unknown_Code" ACONTEXT="CFY2023dFY">5</TE></TR>
<TR><TE ACODE="ifrs-full_Inventories" ACONTEXT="CFY2023eFY">-</TE></TR>
</TABLE>"#;

    fn value_of(fields: &[ExtractedField], name: &str) -> Option<i64> {
        fields.iter().find(|f| f.field == name).map(|f| f.value)
    }

    #[test]
    fn context_grammar() {
        let ctx = parse_context("BPFY2021eFY").unwrap();
        assert_eq!(ctx.offset, PeriodOffset::TwoYearsPrior);
        assert_eq!(ctx.year, 2021);
        assert_eq!(ctx.consolidation, ConsolidationType::Consolidated);
        let ctx = parse_context("PFY2022dFY_x_SeparateMember").unwrap();
        assert_eq!(ctx.offset, PeriodOffset::Prior);
        assert_eq!(ctx.consolidation, ConsolidationType::Separate);
        assert!(parse_context("FY2022").is_none());
    }

    #[test]
    fn matches_year_and_consolidation_with_statement_units() {
        let mut units = BTreeMap::new();
        units.insert(StatementKind::BalanceSheet, UnitMultiplier::Million);
        let mut diags = Vec::new();
        let fields = extract_structured_fields(
            TAGGED,
            &dictionary(),
            2023,
            Some(2023),
            ConsolidationType::Consolidated,
            &units,
            &mut diags,
        );
        assert_eq!(value_of(&fields, "total_assets"), Some(1_500_000_000));
        // first element wins, income statement has no detected unit
        assert_eq!(value_of(&fields, "revenue"), Some(-200));
        assert_eq!(value_of(&fields, "inventories"), None);
        assert!(diags.is_empty());

        let separate = extract_structured_fields(
            TAGGED,
            &dictionary(),
            2023,
            Some(2023),
            ConsolidationType::Separate,
            &BTreeMap::new(),
            &mut diags,
        );
        assert_eq!(value_of(&separate, "total_assets"), Some(900));
        assert_eq!(separate.len(), 1);
    }

    #[test]
    fn prior_year_contexts_are_selectable() {
        let mut diags = Vec::new();
        let fields = extract_structured_fields(
            TAGGED,
            &dictionary(),
            2022,
            Some(2023),
            ConsolidationType::Consolidated,
            &BTreeMap::new(),
            &mut diags,
        );
        assert_eq!(value_of(&fields, "total_assets"), Some(1_400));
    }

    #[test]
    fn comparative_context_never_wins_the_current_year() {
        let markup = r#"<TE ACODE="ifrs-full_Assets" ACONTEXT="PFY2023eFY">1,400</TE>
<TE ACODE="ifrs-full_Assets" ACONTEXT="CFY2023eFY">1,500</TE>"#;
        let mut diags = Vec::new();
        let fields = extract_structured_fields(
            markup,
            &dictionary(),
            2023,
            first_current_year(markup),
            ConsolidationType::Consolidated,
            &BTreeMap::new(),
            &mut diags,
        );
        assert_eq!(value_of(&fields, "total_assets"), Some(1_500));

        // a 2024 filing reports 2023 as its prior period
        let fields = extract_structured_fields(
            markup,
            &dictionary(),
            2023,
            Some(2024),
            ConsolidationType::Consolidated,
            &BTreeMap::new(),
            &mut diags,
        );
        assert_eq!(value_of(&fields, "total_assets"), Some(1_400));

        let fields = extract_structured_fields(
            markup,
            &dictionary(),
            2023,
            Some(2027),
            ConsolidationType::Consolidated,
            &BTreeMap::new(),
            &mut diags,
        );
        assert!(fields.is_empty());
    }

    #[test]
    fn offsets_follow_the_document_year() {
        assert_eq!(expected_offset(2023, 2023), Some(PeriodOffset::Current));
        assert_eq!(expected_offset(2023, 2022), Some(PeriodOffset::Prior));
        assert_eq!(expected_offset(2023, 2021), Some(PeriodOffset::TwoYearsPrior));
        assert_eq!(expected_offset(2023, 2024), None);
    }

    #[test]
    fn current_year_from_first_context() {
        assert_eq!(first_current_year(TAGGED), Some(2023));
        assert_eq!(first_current_year("<P>no tags</P>"), None);
    }
}
