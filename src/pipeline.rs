// src/pipeline.rs
//! Loader → locator → strategies → merger, composed per document.

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::context::RunContext;
use crate::document::{load_archive, DocumentMetadata, SourceDocument};
use crate::extractors::{
    extract_structured_fields, extract_tabular, extract_text_fields, first_current_year, is_tabular_dialect,
    SectionLocator,
};
use crate::merge::Merger;
use crate::model::{ConsolidationType, Diagnostic, StatementKind, StatementRecord, StatementSection, UnitMultiplier};
use crate::utils::error::ExtractError;
use crate::utils::text::flatten_markup;

// "사업보고서 (2023.12)"
static TITLE_PERIOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*((?:19|20)[0-9]{2})\s*\.\s*[0-9]{1,2}\s*\)").expect("Failed to compile TITLE_PERIOD_RE"));

// Balance-sheet identity tolerance, in percent of total assets.
const PLAUSIBILITY_TOLERANCE_PCT: i128 = 1;

/// What to extract from a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Defaults to the document's own current year.
    pub fiscal_year: Option<i32>,
    pub consolidation: ConsolidationType,
}

impl ExtractionRequest {
    pub fn new(fiscal_year: Option<i32>, consolidation: ConsolidationType) -> Self {
        Self {
            fiscal_year,
            consolidation,
        }
    }
}

/// The fiscal year a document reports as its current period: report title
/// `(YYYY.MM)`, then the first current-period context tag, then the year
/// before submission.
pub fn document_year(doc: &SourceDocument) -> Option<i32> {
    let from_title = doc
        .report_title()
        .and_then(|t| TITLE_PERIOD_RE.captures(t))
        .and_then(|c| c.get(1))
        .and_then(|y| y.as_str().parse().ok());
    from_title
        .or_else(|| first_current_year(&doc.text))
        .or_else(|| doc.metadata.submission_date.map(|d| d.year() - 1))
}

/// Records an `Implausible` diagnostic when assets differ from liabilities
/// plus equity by more than the tolerance. Values are never changed.
pub fn check_plausibility(fields: &BTreeMap<String, i64>, diagnostics: &mut Vec<Diagnostic>) {
    let (Some(assets), Some(liabilities), Some(equity)) = (
        fields.get("total_assets"),
        fields.get("total_liabilities"),
        fields.get("total_equity"),
    ) else {
        return;
    };
    let assets = i128::from(*assets);
    let diff = (assets - i128::from(*liabilities) - i128::from(*equity)).abs();
    if diff * 100 > assets.abs() * PLAUSIBILITY_TOLERANCE_PCT {
        tracing::warn!(
            "Balance sheet does not balance: assets {} vs liabilities {} + equity {}",
            assets,
            liabilities,
            equity
        );
        diagnostics.push(Diagnostic::Implausible {
            detail: format!(
                "total_assets {} differs from total_liabilities {} + total_equity {} by {}",
                assets, liabilities, equity, diff
            ),
        });
    }
}

/// Runs the extraction stages for one document at a time.
pub struct Pipeline<'a> {
    ctx: &'a RunContext,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Opens `bytes` as a filing archive and extracts the requested statement set.
    pub fn extract_archive(
        &self,
        bytes: &[u8],
        metadata: DocumentMetadata,
        request: &ExtractionRequest,
    ) -> Result<StatementRecord, ExtractError> {
        let doc = load_archive(bytes, metadata, &self.ctx.config)?;
        self.extract_document(&doc, request)
    }

    /// Separate statements first; if nothing resolves, consolidated ones with a
    /// `ConsolidatedFallback` diagnostic.
    pub fn extract_preferred(&self, doc: &SourceDocument, fiscal_year: Option<i32>) -> Result<StatementRecord, ExtractError> {
        let separate = self.extract_document(doc, &ExtractionRequest::new(fiscal_year, ConsolidationType::Separate))?;
        if !separate.is_empty() {
            return Ok(separate);
        }

        tracing::info!("No separate statements in {}; trying consolidated", doc.metadata.receipt_id);
        let mut consolidated =
            self.extract_document(doc, &ExtractionRequest::new(fiscal_year, ConsolidationType::Consolidated))?;
        if consolidated.is_empty() {
            return Ok(separate);
        }
        consolidated.diagnostics.push(Diagnostic::ConsolidatedFallback);
        Ok(consolidated)
    }

    /// Statement spans the locator finds for `consolidation`, for debug output.
    pub fn locate_sections(&self, doc: &SourceDocument, consolidation: ConsolidationType) -> Vec<StatementSection> {
        let locator = SectionLocator::new(&doc.text, self.ctx.dictionary.as_ref());
        StatementKind::ALL
            .into_iter()
            .filter_map(|kind| locator.locate(kind, consolidation, &self.ctx.config).section)
            .collect()
    }

    pub fn extract_document(&self, doc: &SourceDocument, request: &ExtractionRequest) -> Result<StatementRecord, ExtractError> {
        let dictionary = self.ctx.dictionary.as_ref();
        let config = &self.ctx.config;
        let mut diagnostics = doc.diagnostics.clone();

        let current_year = document_year(doc);
        let fiscal_year = request
            .fiscal_year
            .or(current_year)
            .ok_or_else(|| ExtractError::UnknownFiscalYear(doc.metadata.receipt_id.clone()))?;
        // Text and tables only carry the current period reliably.
        let comparative = match current_year {
            Some(year) if year != fiscal_year => {
                tracing::warn!(
                    "Requested {} but {} reports {}; using tagged values only",
                    fiscal_year,
                    doc.metadata.receipt_id,
                    year
                );
                diagnostics.push(Diagnostic::ComparativePeriod {
                    requested_year: fiscal_year,
                    document_year: year,
                });
                true
            }
            _ => false,
        };

        tracing::info!(
            "Extracting {} {} from {} ({})",
            request.consolidation,
            fiscal_year,
            doc.metadata.receipt_id,
            doc.entry_name
        );

        let mut merger = Merger::new();
        let mut units: BTreeMap<StatementKind, UnitMultiplier> = BTreeMap::new();

        if is_tabular_dialect(&doc.text, doc.type_code.as_deref(), config) {
            diagnostics.push(Diagnostic::TabularDialect);
            let outcome = extract_tabular(&doc.text, dictionary, request.consolidation, config);
            units = outcome.units;
            diagnostics.extend(outcome.diagnostics);
            if !comparative {
                merger.absorb(outcome.fields);
            }
        } else {
            let locator = SectionLocator::new(&doc.text, dictionary);
            for kind in StatementKind::ALL {
                let located = locator.locate(kind, request.consolidation, config);
                diagnostics.extend(located.diagnostics);
                let Some(section) = located.section else {
                    continue;
                };
                units.insert(kind, section.unit);
                if comparative {
                    continue;
                }
                let flat = flatten_markup(section.slice(&doc.text));
                let fields = extract_text_fields(&flat, dictionary, kind, section.unit, &mut diagnostics);
                merger.absorb(fields);
            }
        }

        let tagged = extract_structured_fields(
            &doc.text,
            dictionary,
            fiscal_year,
            current_year,
            request.consolidation,
            &units,
            &mut diagnostics,
        );
        let filled = merger.fill_gaps(tagged);
        if filled > 0 {
            tracing::debug!("Structured codes filled {} gaps", filled);
        }

        merger.aggregate(dictionary.composed(), &mut diagnostics);
        let (fields, sources) = merger.into_parts();
        check_plausibility(&fields, &mut diagnostics);

        tracing::info!(
            "{} {} {}: {} fields, {} diagnostics",
            doc.metadata.filer_code,
            fiscal_year,
            request.consolidation,
            fields.len(),
            diagnostics.len()
        );

        Ok(StatementRecord {
            company: doc.metadata.filer_code.clone(),
            receipt_id: doc.metadata.receipt_id.clone(),
            fiscal_year,
            consolidation: request.consolidation,
            fields,
            sources,
            diagnostics,
            dictionary_version: dictionary.version().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::load_markup;
    use crate::model::Strategy;
    use crate::utils::config::EngineConfig;
    use chrono::NaiveDate;

    fn context() -> RunContext {
        RunContext::load(None, None, EngineConfig::default()).unwrap()
    }

    fn metadata(title: &str) -> DocumentMetadata {
        DocumentMetadata {
            filer_code: "005930".to_string(),
            receipt_id: "20240312000736".to_string(),
            report_title: Some(title.to_string()),
            submission_date: NaiveDate::from_ymd_opt(2024, 3, 12),
            type_code_hint: None,
        }
    }

    fn document(markup: &str, title: &str) -> SourceDocument {
        load_markup(markup.as_bytes(), metadata(title), &EngineConfig::default()).unwrap()
    }

    const ANNUAL: &str = r#"
<DOCUMENT-NAME ACODE="11011">사업보고서</DOCUMENT-NAME>
<TITLE ATOC="Y">4. 재무제표</TITLE>
<P ALIGN="CENTER">재 무 상 태 표</P>
<P>제 55 기 2023.12.31 현재</P>
<TABLE><TR><TD>(단위 : 천원)</TD></TR>
<TR><TD>현금및현금성자산 (주1)</TD><TD>1,234,567</TD></TR>
<TR><TD>자산총계</TD><TD>10,000,000</TD></TR>
<TR><TD>부채총계</TD><TD>4,000,000</TD></TR>
<TR><TD>자본총계</TD><TD>6,000,000</TD></TR>
<TR><TE ACODE="ifrs-full_Inventories" ACONTEXT="CFY2023eFY_ifrs-full_SeparateMember">2,500</TE></TR>
<TR><TE ACODE="ifrs-full_Assets" ACONTEXT="CFY2023eFY_ifrs-full_SeparateMember">99,999</TE></TR>
<TR><TE ACODE="ifrs-full_Assets" ACONTEXT="PFY2022eFY_ifrs-full_SeparateMember">9,000,000</TE></TR>
</TABLE>
<P ALIGN="CENTER">포괄손익계산서</P>
<TABLE><TR><TD>(단위 : 천원)</TD></TR>
<TR><TD>매출액</TD><TD>5,000,000</TD></TR>
<TR><TD>당기순이익</TD><TD>(300,000)</TD></TR></TABLE>
<P ALIGN="CENTER">현금흐름표</P>
<TABLE><TR><TD>(단위 : 천원)</TD></TR>
<TR><TD>유형자산의 취득</TD><TD>(10,000)</TD></TR>
<TR><TD>무형자산의 취득</TD><TD>(5,000)</TD></TR>
<TR><TD>투자부동산의 취득</TD><TD>20,000</TD></TR></TABLE>
<P ALIGN="CENTER">자본변동표</P>
<TITLE ATOC="Y">5. 재무제표 주석</TITLE>
"#;

    #[test]
    fn annual_report_end_to_end() {
        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let doc = document(ANNUAL, "사업보고서 (2023.12)");
        let record = pipeline
            .extract_document(&doc, &ExtractionRequest::new(None, ConsolidationType::Separate))
            .unwrap();

        assert_eq!(record.fiscal_year, 2023);
        assert_eq!(record.get("cash_and_equivalents"), Some(1_234_567_000));
        // text value wins over the tagged one
        assert_eq!(record.get("total_assets"), Some(10_000_000_000));
        assert_eq!(record.sources["total_assets"], Strategy::TextPattern);
        // tag fills the gap, scaled by the balance sheet unit
        assert_eq!(record.get("inventories"), Some(2_500_000));
        assert_eq!(record.sources["inventories"], Strategy::StructuredCode);
        assert_eq!(record.get("revenue"), Some(5_000_000_000));
        assert_eq!(record.get("net_income"), Some(-300_000_000));
        assert_eq!(record.get("capex"), Some(35_000_000));
        assert_eq!(record.get("acquisition_of_ppe"), None);
        assert!(!record.has_diagnostic(|d| matches!(d, Diagnostic::Implausible { .. })));
    }

    #[test]
    fn reprocessing_is_idempotent() {
        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let doc = document(ANNUAL, "사업보고서 (2023.12)");
        let request = ExtractionRequest::new(Some(2023), ConsolidationType::Separate);
        let first = pipeline.extract_document(&doc, &request).unwrap();
        let second = pipeline.extract_document(&doc, &request).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn comparative_year_uses_tags_only() {
        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let doc = document(ANNUAL, "사업보고서 (2023.12)");
        let record = pipeline
            .extract_document(&doc, &ExtractionRequest::new(Some(2022), ConsolidationType::Separate))
            .unwrap();
        assert_eq!(record.get("total_assets"), Some(9_000_000_000));
        assert_eq!(record.get("revenue"), None);
        assert!(record.has_diagnostic(|d| matches!(
            d,
            Diagnostic::ComparativePeriod { requested_year: 2022, document_year: 2023 }
        )));
    }

    #[test]
    fn consolidated_fallback_when_separate_is_empty() {
        let markup = r#"
<TITLE>2. 연결재무제표</TITLE>
<P>연결재무상태표</P><P>(단위 : 백만원)</P>
<TABLE><TR><TD>자산총계</TD><TD>7,000</TD></TR></TABLE>
<TITLE>3. 연결재무제표 주석</TITLE>"#;
        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let record = pipeline.extract_preferred(&document(markup, "사업보고서 (2023.12)"), None).unwrap();
        assert_eq!(record.consolidation, ConsolidationType::Consolidated);
        assert_eq!(record.get("total_assets"), Some(7_000_000_000));
        assert!(record.has_diagnostic(|d| *d == Diagnostic::ConsolidatedFallback));
    }

    #[test]
    fn audit_report_uses_tables() {
        let markup = r#"<DOCUMENT-NAME ACODE="00760">감사보고서</DOCUMENT-NAME>
<P>재무상태표</P><P>(단위 : 원)</P>
<TABLE>
<TR><TD>과목</TD><TD>주석</TD><TD>당기</TD><TD></TD></TR>
<TR><TD>유동자산</TD><TD></TD><TD>(1,000)</TD><TD>2,000</TD></TR>
</TABLE>"#;
        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let doc = document(markup, "감사보고서 (2023.12)");
        let record = pipeline
            .extract_document(&doc, &ExtractionRequest::new(None, ConsolidationType::Separate))
            .unwrap();
        assert_eq!(record.get("current_assets"), Some(-1_000));
        assert_eq!(record.sources["current_assets"], Strategy::Tabular);
        assert!(record.has_diagnostic(|d| *d == Diagnostic::TabularDialect));
    }

    #[test]
    fn fiscal_year_resolution_order() {
        let doc = document("<P>재무상태표</P>", "사업보고서");
        // no title period, no context tags: submission year minus one
        assert_eq!(document_year(&doc), Some(2023));
        let tagged = document(r#"<P>재무상태표</P><TE ACODE="x" ACONTEXT="CFY2021eFY">1</TE>"#, "사업보고서");
        assert_eq!(document_year(&tagged), Some(2021));
        let titled = document("<P>재무상태표</P>", "사업보고서 (2020.12)");
        assert_eq!(document_year(&titled), Some(2020));

        let mut unknown = document("<P>재무상태표</P>", "사업보고서");
        unknown.metadata.submission_date = None;
        let ctx = context();
        let err = Pipeline::new(&ctx)
            .extract_document(&unknown, &ExtractionRequest::new(None, ConsolidationType::Separate))
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnknownFiscalYear(_)));
    }

    #[test]
    fn archive_entry_is_chosen_and_extracted() {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;
        use zip::ZipWriter;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("00000000.xml", options).unwrap();
        zip.write_all(ANNUAL.as_bytes()).unwrap();
        zip.start_file("logo.png", options).unwrap();
        zip.write_all(b"\x89PNG").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let request = ExtractionRequest::new(None, ConsolidationType::Separate);
        let record = pipeline
            .extract_archive(&bytes, metadata("사업보고서 (2023.12)"), &request)
            .unwrap();
        assert_eq!(record.get("cash_and_equivalents"), Some(1_234_567_000));

        let err = pipeline
            .extract_archive(b"not a zip", metadata("사업보고서 (2023.12)"), &request)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Load(_)));
    }

    #[test]
    fn parent_heading_fallback_reaches_the_record() {
        let markup = r#"
<TITLE ATOC="Y">III. 재무에 관한 사항</TITLE>
<TITLE ATOC="Y">4. 재무제표</TITLE>
<P>(단위 : 원)</P>
<TABLE><TR><TD>유동자산</TD><TD>3,000,000</TD></TR>
<TR><TD>자산총계</TD><TD>9,000,000</TD></TR>
<TR><TD>부채총계</TD><TD>4,000,000</TD></TR></TABLE>
<TITLE ATOC="Y">5. 재무제표 주석</TITLE>
<P>자산총계 1,111,111</P>
"#;
        let ctx = context();
        let pipeline = Pipeline::new(&ctx);
        let record = pipeline
            .extract_document(
                &document(markup, "사업보고서 (2023.12)"),
                &ExtractionRequest::new(None, ConsolidationType::Separate),
            )
            .unwrap();
        assert_eq!(record.get("total_assets"), Some(9_000_000));
        assert_eq!(record.get("current_assets"), Some(3_000_000));
        assert!(record.has_diagnostic(|d| matches!(
            d,
            Diagnostic::ParentSectionFallback { statement: StatementKind::BalanceSheet, .. }
        )));
    }

    #[test]
    fn unbalanced_sheet_is_flagged() {
        let mut fields = BTreeMap::new();
        fields.insert("total_assets".to_string(), 1_000);
        fields.insert("total_liabilities".to_string(), 400);
        fields.insert("total_equity".to_string(), 500);
        let mut diags = Vec::new();
        check_plausibility(&fields, &mut diags);
        assert_eq!(diags.len(), 1);

        fields.insert("total_equity".to_string(), 595);
        let mut diags = Vec::new();
        check_plausibility(&fields, &mut diags);
        assert!(diags.is_empty());
    }
}
