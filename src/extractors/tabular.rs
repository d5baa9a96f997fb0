// src/extractors/tabular.rs

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};

use crate::amount::normalize_amount;
use crate::dictionary::AccountDictionary;
use crate::extractors::section::TitlePattern;
use crate::extractors::unit::detect_unit;
use crate::model::{ConsolidationType, Diagnostic, ExtractedField, StatementKind, Strategy, UnitMultiplier};
use crate::utils::config::EngineConfig;
use crate::utils::text::{collapse_whitespace, compact, flatten_markup, head, strip_ordinal_prefix};

// --- Regex Patterns (Lazy Static) ---
// Cells and paragraphs that may carry a statement title in audit-report markup.
static TITLE_CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:TD|TH|P|TITLE)\b[^>]*>(.*?)</(?:TD|TH|P|TITLE)>").expect("Failed to compile TITLE_CELL_RE")
});

static TABLE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(/?)TABLE\b[^>]*>").expect("Failed to compile TABLE_TAG_RE"));

static TITLE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<TITLE\b").expect("Failed to compile TITLE_TAG_RE"));

// A whole cell holding one amount: "1,234", "(1,234)", "△1,234", "-1,234.5".
static CELL_AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\(（]?\s*[-−△▲]?\s*[0-9][0-9,]*(?:\.[0-9]+)?\s*[\)）]?$").expect("Failed to compile CELL_AMOUNT_RE")
});

// A note reference cell: "4", "5,6", "주7", "(주석 3)".
static NOTE_CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\(（]?\s*(?:주석?\s*)?[0-9]{1,2}(?:\s*[,~\-]\s*[0-9]{1,2})*\s*[\)）]?$")
        .expect("Failed to compile NOTE_CELL_RE")
});

// --- CSS Selectors (Lazy Static) ---
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));

// --- Data Structures ---

/// One statement table found after a title marker, as byte offsets into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCandidate {
    pub marker: usize,
    pub start: usize,
    pub end: usize,
}

impl TableCandidate {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Everything the tabular pass produced for one document.
#[derive(Debug, Default)]
pub struct TabularOutcome {
    pub fields: Vec<ExtractedField>,
    pub units: BTreeMap<StatementKind, UnitMultiplier>,
    pub diagnostics: Vec<Diagnostic>,
}

// --- Dialect Detection ---

/// Audit-report documents carry their statements in plain tables with no
/// section-title elements and no tagged values.
pub fn is_tabular_dialect(text: &str, type_code: Option<&str>, config: &EngineConfig) -> bool {
    if let Some(code) = type_code {
        if config.tabular_type_codes.iter().any(|c| c == code) {
            return true;
        }
    }
    !TITLE_TAG_RE.is_match(text) && TABLE_TAG_RE.is_match(text)
}

// --- Table Location ---

/// Tables following each title marker of `titles`. The first title pattern
/// with any marker decides; every marker of that pattern contributes its
/// following table.
pub fn find_statement_tables(text: &str, titles: &[TitlePattern]) -> Vec<TableCandidate> {
    for title in titles {
        let mut candidates: Vec<TableCandidate> = Vec::new();
        for caps in TITLE_CELL_RE.captures_iter(text) {
            let (Some(cell), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !title.is_title_run(&flatten_markup(inner.as_str())) {
                continue;
            }
            let Some(start) = next_table_start(text, cell.end()) else {
                continue;
            };
            if candidates.iter().any(|c| c.start == start) {
                continue;
            }
            let end = table_end(text, start);
            tracing::trace!("'{}' marker at {} -> table {}..{}", title.literal(), cell.start(), start, end);
            candidates.push(TableCandidate {
                marker: cell.start(),
                start,
                end,
            });
        }
        if !candidates.is_empty() {
            return candidates;
        }
    }
    Vec::new()
}

fn next_table_start(text: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(caps) = TABLE_TAG_RE.captures_at(text, pos) {
        let tag = caps.get(0)?;
        if caps.get(1).map_or(false, |slash| slash.as_str().is_empty()) {
            return Some(tag.start());
        }
        pos = tag.end();
    }
    None
}

/// End offset of the table opening at `start`, honouring nested tables.
/// An unclosed table runs to the end of the document.
fn table_end(text: &str, start: usize) -> usize {
    let mut depth = 0usize;
    let mut pos = start;
    while let Some(caps) = TABLE_TAG_RE.captures_at(text, pos) {
        let (Some(tag), Some(slash)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        if slash.as_str().is_empty() {
            depth += 1;
        } else {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return tag.end();
            }
        }
        pos = tag.end();
    }
    text.len()
}

/// The largest candidate of at least `min_bytes`, else the largest overall.
/// Ties go to the earliest candidate.
pub fn choose_table(candidates: &[TableCandidate], min_bytes: usize) -> Option<TableCandidate> {
    let largest = |pool: &mut dyn Iterator<Item = &TableCandidate>| {
        pool.fold(None::<TableCandidate>, |best, c| match best {
            Some(b) if b.len() >= c.len() => Some(b),
            _ => Some(*c),
        })
    };
    largest(&mut candidates.iter().filter(|c| c.len() >= min_bytes)).or_else(|| largest(&mut candidates.iter()))
}

// --- Row Parsing ---

/// Rows of the table as cell texts. Only direct cells of each row are read, so
/// a nested table does not duplicate its parent's cells.
pub fn parse_rows(table_html: &str) -> Vec<Vec<String>> {
    let fragment = Html::parse_fragment(table_html);
    fragment
        .select(&ROW_SELECTOR)
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                .collect()
        })
        .collect()
}

/// Label and raw amount of a row.
///
/// With three or more cells after the label the layout is
/// `label | note | detail | subtotal | ...`: the detail amount is taken, or the
/// subtotal when the detail cell holds no digits. Shorter rows are
/// `label | current | ...`, or `label | note | current` when the first cell
/// is a note reference.
pub fn row_amount(cells: &[String]) -> Option<(String, &str)> {
    let label_idx = cells.iter().position(|c| !c.trim().is_empty())?;
    let label = clean_label(&cells[label_idx]);
    if label.is_empty() {
        return None;
    }
    let after = &cells[label_idx + 1..];

    let raw = if after.len() >= 3 {
        let detail = after[1].trim();
        if detail.chars().any(|c| c.is_ascii_digit()) {
            detail
        } else {
            after[2].trim()
        }
    } else if after.len() == 2 && NOTE_CELL_RE.is_match(after[0].trim()) {
        after[1].trim()
    } else {
        after.first()?.trim()
    };
    if !CELL_AMOUNT_RE.is_match(raw) {
        return None;
    }
    Some((label, raw))
}

fn clean_label(cell: &str) -> String {
    let squeezed = compact(cell);
    strip_ordinal_prefix(&squeezed).to_string()
}

// --- Extraction ---

/// Runs the tabular pass over every statement of `consolidation`.
pub fn extract_tabular(
    text: &str,
    dictionary: &AccountDictionary,
    consolidation: ConsolidationType,
    config: &EngineConfig,
) -> TabularOutcome {
    let mut outcome = TabularOutcome::default();

    for kind in StatementKind::ALL {
        let candidates = find_statement_tables(text, dictionary.titles(kind, consolidation));
        let Some(table) = choose_table(&candidates, config.min_table_bytes) else {
            tracing::info!("No {} {} table found", consolidation, kind);
            outcome.diagnostics.push(Diagnostic::SectionAbsent { statement: kind });
            continue;
        };
        if candidates.len() > 1 {
            tracing::warn!(
                "{} candidate tables for {} {}; chose {} bytes at {}",
                candidates.len(),
                consolidation,
                kind,
                table.len(),
                table.start
            );
            outcome.diagnostics.push(Diagnostic::AmbiguousTable {
                statement: kind,
                candidates: candidates.len(),
                chosen_bytes: table.len(),
            });
        }

        let unit = detect_unit(head(&text[table.marker..table.end], config.unit_scan_window));
        outcome.units.insert(kind, unit);

        let fields = fields_from_rows(&parse_rows(&text[table.start..table.end]), dictionary, kind, unit, &mut outcome.diagnostics);
        tracing::info!("Tabular pass resolved {} {} fields (unit {:?})", fields.len(), kind, unit);
        outcome.fields.extend(fields);
    }

    outcome
}

/// Maps rows to fields; the first row resolving a field wins.
pub fn fields_from_rows(
    rows: &[Vec<String>],
    dictionary: &AccountDictionary,
    kind: StatementKind,
    unit: UnitMultiplier,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<ExtractedField> {
    let mut found = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in rows {
        let Some((label, raw)) = row_amount(row) else {
            continue;
        };
        let Some(field) = dictionary.match_label(&label, kind) else {
            continue;
        };
        if seen.contains(field) {
            continue;
        }
        match normalize_amount(raw, unit) {
            Some(value) => {
                tracing::debug!("{}: row '{}' -> {}", field, label, value);
                seen.insert(field.to_string());
                found.push(ExtractedField {
                    field: field.to_string(),
                    value,
                    strategy: Strategy::Tabular,
                    origin: Some(kind),
                });
            }
            None => diagnostics.push(Diagnostic::UnparseableNumeral {
                field: field.to_string(),
                raw: raw.to_string(),
            }),
        }
    }
    found
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> AccountDictionary {
        AccountDictionary::builtin().unwrap()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    const AUDIT_DOC: &str = r#"
<BODY>
<TABLE><TR><TD>독립된 감사인의 감사보고서</TD></TR></TABLE>
<P>재 무 상 태 표</P>
<P>제 10 기 2023년 12월 31일 현재</P>
<P>(단위 : 원)</P>
<TABLE BORDER="1">
<TR><TH>과 목</TH><TH>주석</TH><TH colspan="2">제 10 기</TH></TR>
<TR><TD>Ⅰ. 유동자산</TD><TD></TD><TD>(1,000)</TD><TD>2,000</TD></TR>
<TR><TD>재고자산</TD><TD>5</TD><TD></TD><TD>3,000</TD></TR>
<TR><TD>자 산 총 계</TD><TD></TD><TD></TD><TD>9,000</TD></TR>
<TR><TD>유동자산</TD><TD></TD><TD>7,777</TD><TD>7,777</TD></TR>
</TABLE>
<P>손익계산서</P>
<P>(단위 : 천원)</P>
<TABLE>
<TR><TD>매출액</TD><TD>4</TD><TD></TD><TD>50,000</TD></TR>
<TR><TD>당기순이익</TD><TD></TD><TD></TD><TD>(1,200)</TD></TR>
</TABLE>
</BODY>"#;

    #[test]
    fn dialect_detection() {
        let config = EngineConfig::default();
        assert!(is_tabular_dialect("<P>x</P>", Some("00760"), &config));
        assert!(is_tabular_dialect(AUDIT_DOC, None, &config));
        assert!(!is_tabular_dialect("<TITLE>1. 재무제표</TITLE><TABLE></TABLE>", Some("11011"), &config));
    }

    #[test]
    fn detail_cell_before_subtotal() {
        // scenario: label, empty note, detail "(1,000)", subtotal "2,000"
        let row = cells(&["유동자산", "", "(1,000)", "2,000"]);
        let (label, raw) = row_amount(&row).unwrap();
        assert_eq!(label, "유동자산");
        assert_eq!(raw, "(1,000)");

        let mut diags = Vec::new();
        let fields = fields_from_rows(&[row], &dictionary(), StatementKind::BalanceSheet, UnitMultiplier::Base, &mut diags);
        assert_eq!(fields[0].field, "current_assets");
        assert_eq!(fields[0].value, -1_000);
    }

    #[test]
    fn subtotal_when_detail_is_empty_and_short_rows() {
        let row = cells(&["재고자산", "5", "", "3,000"]);
        assert_eq!(row_amount(&row).map(|(_, raw)| raw), Some("3,000"));
        let short = cells(&["", "자산총계", "12,345", "11,000"]);
        assert_eq!(row_amount(&short), Some(("자산총계".to_string(), "12,345")));
        assert_eq!(row_amount(&cells(&["과목", "주석", "제 10 기"])), None);
    }

    #[test]
    fn note_column_is_not_an_amount() {
        let row = cells(&["매출채권", "4", "1,250,000"]);
        assert_eq!(row_amount(&row), Some(("매출채권".to_string(), "1,250,000")));
        let row = cells(&["재고자산", "(주석 5,6)", "(300)"]);
        assert_eq!(row_amount(&row).map(|(_, raw)| raw), Some("(300)"));
        // two amounts: current then prior
        let row = cells(&["자산총계", "12,345", "11,000"]);
        assert_eq!(row_amount(&row).map(|(_, raw)| raw), Some("12,345"));
    }

    #[test]
    fn nested_tables_are_measured_whole() {
        let text = "<P>재무상태표</P><TABLE><TR><TD><TABLE><TR><TD>x</TD></TR></TABLE></TD></TR></TABLE><P>tail</P>";
        let title = TitlePattern::new("재무상태표").unwrap();
        let found = find_statement_tables(text, std::slice::from_ref(&title));
        assert_eq!(found.len(), 1);
        assert!(text[found[0].start..found[0].end].ends_with("</TABLE></TD></TR></TABLE>"));
    }

    #[test]
    fn largest_table_above_threshold_wins() {
        let small = TableCandidate { marker: 0, start: 0, end: 100 };
        let big = TableCandidate { marker: 0, start: 200, end: 2_600 };
        let bigger_late = TableCandidate { marker: 0, start: 3_000, end: 5_400 };
        assert_eq!(choose_table(&[small, big, bigger_late], 2_000), Some(big));
        assert_eq!(choose_table(&[small], 2_000), Some(small));
        assert_eq!(choose_table(&[], 2_000), None);
    }

    #[test]
    fn audit_document_end_to_end() {
        let outcome = extract_tabular(AUDIT_DOC, &dictionary(), ConsolidationType::Separate, &EngineConfig::default());
        let get = |name: &str| outcome.fields.iter().find(|f| f.field == name).map(|f| f.value);

        assert_eq!(get("current_assets"), Some(-1_000));
        assert_eq!(get("inventories"), Some(3_000));
        assert_eq!(get("total_assets"), Some(9_000));
        assert_eq!(get("revenue"), Some(50_000_000));
        assert_eq!(get("net_income"), Some(-1_200_000));
        assert_eq!(outcome.units.get(&StatementKind::IncomeStatement), Some(&UnitMultiplier::Thousand));
        assert!(outcome
            .diagnostics
            .contains(&Diagnostic::SectionAbsent { statement: StatementKind::CashFlow }));
    }
}
