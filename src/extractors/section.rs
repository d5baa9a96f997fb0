// src/extractors/section.rs

// --- Imports ---
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dictionary::AccountDictionary;
use crate::extractors::unit::{detect_unit, detect_unit_signal};
use crate::model::{ConsolidationType, Diagnostic, StatementKind, StatementSection};
use crate::utils::config::EngineConfig;
use crate::utils::text::{compact, flatten_markup, floor_boundary, head, spaced_pattern, strip_ordinal_prefix};

// --- Constants ---
// A title run may carry a short suffix ("(계속)", "제55기 2023.12.31 현재") but no more.
const MAX_TITLE_SUFFIX_CHARS: usize = 20;

// --- Regex Patterns (Lazy Static) ---
// Numbered top-level headings bounding a parent "financial statements" section.
static TITLE_ELEMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<TITLE\b[^>]*>(.*?)</TITLE>").expect("Failed to compile TITLE_ELEMENT_RE")
});

static NUMBERED_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[0-9]+|[IVX]+|[Ⅰ-Ⅻ]+)\s*\.\s*\S").expect("Failed to compile NUMBERED_HEADING_RE")
});

static PLAIN_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[0-9]+|[IVX]+|[Ⅰ-Ⅻ]+)\.[ \t]*[^\s0-9][^\n<]*$")
        .expect("Failed to compile PLAIN_HEADING_RE")
});

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]{1,3},[0-9]{3}").expect("Failed to compile AMOUNT_RE"));

// --- Data Structures ---

/// A statement / section title compiled to a spacing-tolerant regex.
#[derive(Debug, Clone)]
pub struct TitlePattern {
    literal: String,
    compact: String,
    regex: Regex,
}

impl TitlePattern {
    pub fn new(literal: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            literal: literal.to_string(),
            compact: compact(literal),
            regex: Regex::new(&spaced_pattern(literal))?,
        })
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// Whether the text run `run` reads as this title: an optional ordinal prefix,
    /// the title itself, then at most a short suffix. Body sentences mentioning the
    /// title, and longer titles merely containing it ("연결재무상태표" for
    /// "재무상태표"), are rejected.
    pub fn is_title_run(&self, run: &str) -> bool {
        let decoded = html_escape::decode_html_entities(run);
        let squeezed = compact(&decoded);
        let body = strip_ordinal_prefix(&squeezed);
        match body.strip_prefix(self.compact.as_str()) {
            Some(rest) => is_title_suffix(rest),
            None => false,
        }
    }

    /// Start offsets of every occurrence that stands as a title marker.
    pub fn marker_positions(&self, text: &str) -> Vec<usize> {
        self.regex
            .find_iter(text)
            .filter(|m| self.is_title_run(enclosing_run(text, m.start(), m.end())))
            .map(|m| m.start())
            .collect()
    }
}

/// The text run around `[start, end)`: bounded by the nearest tag edge or newline.
pub fn enclosing_run(text: &str, start: usize, end: usize) -> &str {
    let run_start = text[..start]
        .rfind(|c: char| c == '>' || c == '\n')
        .map_or(0, |i| i + 1);
    let run_end = text[end..]
        .find(|c: char| c == '<' || c == '\n')
        .map_or(text.len(), |i| end + i);
    &text[run_start..run_end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerClass {
    Statement(StatementKind, ConsolidationType),
    Parent(ConsolidationType),
    Terminator,
}

#[derive(Debug, Clone)]
struct TitleMarker {
    start: usize,
    literal: String,
    class: MarkerClass,
}

/// Result of locating one statement.
#[derive(Debug, Clone)]
pub struct LocatedSection {
    pub section: Option<StatementSection>,
    pub diagnostics: Vec<Diagnostic>,
}

// --- Main Locator Structure ---

/// Finds statement spans inside one decoded document. Title markers are
/// collected once per document and shared by every lookup.
pub struct SectionLocator<'a> {
    text: &'a str,
    dictionary: &'a AccountDictionary,
    markers: Vec<TitleMarker>,
}

impl<'a> SectionLocator<'a> {
    pub fn new(text: &'a str, dictionary: &'a AccountDictionary) -> Self {
        let mut markers = Vec::new();
        let consolidations = [ConsolidationType::Separate, ConsolidationType::Consolidated];

        for kind in StatementKind::ALL {
            for consolidation in consolidations {
                for title in dictionary.titles(kind, consolidation) {
                    push_markers(&mut markers, text, title, MarkerClass::Statement(kind, consolidation));
                }
            }
        }
        for consolidation in consolidations {
            for title in dictionary.parent_titles(consolidation) {
                push_markers(&mut markers, text, title, MarkerClass::Parent(consolidation));
            }
        }
        for title in dictionary.terminators() {
            push_markers(&mut markers, text, title, MarkerClass::Terminator);
        }
        markers.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.literal.cmp(&b.literal)));

        tracing::debug!("Collected {} title markers", markers.len());
        Self { text, dictionary, markers }
    }

    /// Locates the span of `kind` for `consolidation`, detecting its unit.
    ///
    /// Title patterns are tried in dictionary order; the span ends at the next
    /// title marker of any other statement (or the end of the document). When no
    /// title matches, the parent "financial statements" section is used and
    /// re-scoped to the window with the highest alias density.
    pub fn locate(
        &self,
        kind: StatementKind,
        consolidation: ConsolidationType,
        config: &EngineConfig,
    ) -> LocatedSection {
        let class = MarkerClass::Statement(kind, consolidation);

        for title in self.dictionary.titles(kind, consolidation) {
            let Some(marker) = self
                .markers
                .iter()
                .find(|m| m.class == class && m.literal == title.literal())
            else {
                tracing::trace!("No '{}' title marker", title.literal());
                continue;
            };
            let end = self
                .markers
                .iter()
                .find(|m| m.start > marker.start && m.class != class)
                .map_or(self.text.len(), |m| m.start);
            let unit = detect_unit(head(&self.text[marker.start..end], config.unit_scan_window));
            tracing::info!(
                "Located {} {} via '{}' at {}..{} (unit {:?})",
                consolidation,
                kind,
                title.literal(),
                marker.start,
                end,
                unit
            );
            return LocatedSection {
                section: Some(StatementSection {
                    kind,
                    consolidation,
                    start: marker.start,
                    end,
                    unit,
                    via_parent_fallback: false,
                }),
                diagnostics: Vec::new(),
            };
        }

        match self.locate_via_parent(kind, consolidation, config) {
            Some(section) => {
                tracing::warn!(
                    "No {} {} title; using parent section window {}..{}",
                    consolidation,
                    kind,
                    section.start,
                    section.end
                );
                LocatedSection {
                    diagnostics: vec![Diagnostic::ParentSectionFallback {
                        statement: kind,
                        start: section.start,
                        end: section.end,
                    }],
                    section: Some(section),
                }
            }
            None => {
                tracing::info!("{} {} absent from document", consolidation, kind);
                LocatedSection {
                    section: None,
                    diagnostics: vec![Diagnostic::SectionAbsent { statement: kind }],
                }
            }
        }
    }

    fn locate_via_parent(
        &self,
        kind: StatementKind,
        consolidation: ConsolidationType,
        config: &EngineConfig,
    ) -> Option<StatementSection> {
        let parent = self
            .markers
            .iter()
            .find(|m| m.class == MarkerClass::Parent(consolidation))?;
        let parent_end = self.next_sibling_heading(parent.start).unwrap_or(self.text.len());
        let (start, end) = self.densest_window(kind, parent.start, parent_end, config.rescope_window)?;

        let unit = detect_unit_signal(head(&self.text[start..end], config.unit_scan_window))
            .unwrap_or_else(|| detect_unit(head(&self.text[parent.start..parent_end], config.unit_scan_window)));

        Some(StatementSection {
            kind,
            consolidation,
            start,
            end,
            unit,
            via_parent_fallback: true,
        })
    }

    /// Start of the next numbered top-level heading after the one at `after`.
    fn next_sibling_heading(&self, after: usize) -> Option<usize> {
        // skip past the parent heading's own run
        let from = self.text[after..]
            .find(|c: char| c == '<' || c == '\n')
            .map_or(self.text.len(), |i| after + i);
        let rest = &self.text[from..];

        let tagged = TITLE_ELEMENT_RE
            .captures_iter(rest)
            .filter(|c| c.get(1).map_or(false, |t| NUMBERED_HEADING_RE.is_match(&flatten_markup(t.as_str()))))
            .filter_map(|c| c.get(0).map(|m| m.start()))
            .next();
        let plain = PLAIN_HEADING_RE
            .find_iter(rest)
            .filter(|m| !AMOUNT_RE.is_match(m.as_str()))
            .map(|m| m.start())
            .next();

        match (tagged, plain) {
            (Some(a), Some(b)) => Some(from + a.min(b)),
            (Some(a), None) | (None, Some(a)) => Some(from + a),
            (None, None) => None,
        }
    }

    /// Re-scopes `[start, end)` to the window with the most aliases of `kind`.
    /// Windows overlap by half; ties go to the earliest window.
    fn densest_window(&self, kind: StatementKind, start: usize, end: usize, window: usize) -> Option<(usize, usize)> {
        let window = window.max(1);
        let step = (window / 2).max(1);
        let mut best: Option<(usize, usize, usize)> = None;

        let mut cursor = start;
        loop {
            let w_start = floor_boundary(self.text, cursor);
            let w_end = floor_boundary(self.text, (cursor + window).min(end));
            let squeezed = compact(&flatten_markup(&self.text[w_start..w_end]));
            let hits: usize = self
                .dictionary
                .fields_for(kind)
                .flat_map(|f| f.aliases.iter())
                .map(|a| squeezed.matches(a.compact.as_str()).count())
                .sum();
            if hits > 0 && best.map_or(true, |(_, _, h)| hits > h) {
                best = Some((w_start, w_end, hits));
            }
            if cursor + window >= end {
                break;
            }
            cursor += step;
        }

        best.map(|(s, e, hits)| {
            tracing::debug!("Densest {} window {}..{} with {} alias hits", kind, s, e, hits);
            (s, e)
        })
    }
}

/// Empty, or a short qualifier such as "(계속)", "제55기 ...", "- 2023.12.31".
/// Anything else (a particle like "에", more words) means the title is inside a sentence.
fn is_title_suffix(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(first) => {
            rest.chars().count() <= MAX_TITLE_SUFFIX_CHARS
                && (first.is_ascii_digit() || "(（[【-–:：제당전".contains(first))
        }
    }
}

fn push_markers(markers: &mut Vec<TitleMarker>, text: &str, title: &TitlePattern, class: MarkerClass) {
    for start in title.marker_positions(text) {
        markers.push(TitleMarker {
            start,
            literal: title.literal().to_string(),
            class,
        });
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> AccountDictionary {
        AccountDictionary::builtin().unwrap()
    }

    const DART_DOC: &str = r#"
<DOCUMENT>
<TITLE ATOC="Y">2. 연결재무제표</TITLE>
<P ALIGN="CENTER">연 결 재 무 상 태 표</P>
<TABLE><TR><TD>(단위 : 백만원)</TD></TR>
<TR><TD>자산총계</TD><TD>1,000,000</TD></TR></TABLE>
<P ALIGN="CENTER">연결 포괄손익계산서</P>
<TABLE><TR><TD>(단위 : 백만원)</TD></TR><TR><TD>매출액</TD><TD>500,000</TD></TR></TABLE>
<TITLE ATOC="Y">3. 연결재무제표 주석</TITLE>
<P>연결재무상태표에 계상된 금액은 다음과 같습니다.</P>
<TITLE ATOC="Y">4. 재무제표</TITLE>
<P ALIGN="CENTER">재무상태표</P>
<TABLE><TR><TD>(단위 : 천원)</TD></TR><TR><TD>자산총계</TD><TD>800,000</TD></TR></TABLE>
<P ALIGN="CENTER">자본변동표</P>
</DOCUMENT>
"#;

    #[test]
    fn title_run_rules() {
        let title = TitlePattern::new("재무상태표").unwrap();
        assert!(title.is_title_run("재 무 상 태 표"));
        assert!(title.is_title_run("1. 재무상태표 (계속)"));
        assert!(!title.is_title_run("연결재무상태표"));
        assert!(title.is_title_run("재무상태표 제55기 2023.12.31 현재"));
        assert!(!title.is_title_run("재무상태표에 계상된 금액"));
        assert!(!title.is_title_run("재무상태표에 계상된 금액은 다음과 같으며 이는 회사의 재무상태를 나타냅니다"));
    }

    #[test]
    fn consolidated_and_separate_spans_do_not_bleed() {
        let dict = dictionary();
        let config = EngineConfig::default();
        let locator = SectionLocator::new(DART_DOC, &dict);

        let con = locator
            .locate(StatementKind::BalanceSheet, ConsolidationType::Consolidated, &config)
            .section
            .expect("consolidated balance sheet");
        let slice = con.slice(DART_DOC);
        assert!(slice.contains("1,000,000"));
        assert!(!slice.contains("500,000"));
        assert_eq!(con.unit, crate::model::UnitMultiplier::Million);

        let sep = locator
            .locate(StatementKind::BalanceSheet, ConsolidationType::Separate, &config)
            .section
            .expect("separate balance sheet");
        let slice = sep.slice(DART_DOC);
        assert!(slice.contains("800,000"));
        assert!(!slice.contains("자본변동표"));
        assert_eq!(sep.unit, crate::model::UnitMultiplier::Thousand);
    }

    #[test]
    fn body_mentions_are_not_titles() {
        let dict = dictionary();
        let locator = SectionLocator::new(DART_DOC, &dict);
        let con = locator
            .locate(StatementKind::IncomeStatement, ConsolidationType::Consolidated, &EngineConfig::default())
            .section
            .unwrap();
        // ends at the notes heading, not at the body sentence mentioning a statement
        assert!(con.slice(DART_DOC).contains("500,000"));
        assert!(!con.slice(DART_DOC).contains("주석"));
    }

    #[test]
    fn absent_statement_is_a_diagnostic() {
        let dict = dictionary();
        let locator = SectionLocator::new(DART_DOC, &dict);
        let located = locator.locate(StatementKind::CashFlow, ConsolidationType::Separate, &EngineConfig::default());
        assert!(located.section.is_none());
        assert_eq!(
            located.diagnostics,
            vec![Diagnostic::SectionAbsent { statement: StatementKind::CashFlow }]
        );
    }

    #[test]
    fn parent_section_fallback_is_rescoped_and_reported() {
        let doc = r#"
<TITLE ATOC="Y">III. 재무에 관한 사항</TITLE>
<TITLE ATOC="Y">4. 재무제표</TITLE>
<P>(단위 : 원)</P>
<TABLE><TR><TD>유동자산</TD><TD>3,000,000</TD></TR>
<TR><TD>자산총계</TD><TD>9,000,000</TD></TR>
<TR><TD>부채총계</TD><TD>4,000,000</TD></TR></TABLE>
<TITLE ATOC="Y">5. 재무제표 주석</TITLE>
<P>자산총계 1,111,111</P>
"#;
        let dict = dictionary();
        let locator = SectionLocator::new(doc, &dict);
        let located = locator.locate(StatementKind::BalanceSheet, ConsolidationType::Separate, &EngineConfig::default());
        let section = located.section.expect("fallback section");
        assert!(section.via_parent_fallback);
        assert!(section.slice(doc).contains("9,000,000"));
        assert!(!section.slice(doc).contains("1,111,111"));
        assert!(matches!(
            located.diagnostics.as_slice(),
            [Diagnostic::ParentSectionFallback { statement: StatementKind::BalanceSheet, .. }]
        ));
    }
}
