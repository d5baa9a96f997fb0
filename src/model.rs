// src/model.rs
//! Types shared by every stage: statement kinds, units, extracted fields and
//! the final statement record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::BalanceSheet,
        StatementKind::IncomeStatement,
        StatementKind::CashFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance_sheet",
            StatementKind::IncomeStatement => "income_statement",
            StatementKind::CashFlow => "cash_flow",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationType {
    Separate,
    Consolidated,
}

impl ConsolidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsolidationType::Separate => "separate",
            ConsolidationType::Consolidated => "consolidated",
        }
    }
}

impl fmt::Display for ConsolidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scale factor declared for a statement's numerals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitMultiplier {
    #[default]
    Base,
    Thousand,
    Million,
    HundredMillion,
}

impl UnitMultiplier {
    pub const ALL: [UnitMultiplier; 4] = [
        UnitMultiplier::Base,
        UnitMultiplier::Thousand,
        UnitMultiplier::Million,
        UnitMultiplier::HundredMillion,
    ];

    pub fn factor(&self) -> i64 {
        match self {
            UnitMultiplier::Base => 1,
            UnitMultiplier::Thousand => 1_000,
            UnitMultiplier::Million => 1_000_000,
            UnitMultiplier::HundredMillion => 100_000_000,
        }
    }

    pub fn from_factor(factor: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.factor() == factor)
    }
}

/// Which extraction strategy produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    TextPattern,
    StructuredCode,
    Tabular,
    RemoteApi,
}

/// Character span of one statement inside the decoded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementSection {
    pub kind: StatementKind,
    pub consolidation: ConsolidationType,
    pub start: usize,
    pub end: usize,
    pub unit: UnitMultiplier,
    /// Located through the wider "financial statements" grouping rather than a statement title.
    pub via_parent_fallback: bool,
}

impl StatementSection {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// One candidate value for a canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedField {
    pub field: String,
    pub value: i64,
    pub strategy: Strategy,
    /// Statement the value was scoped to; `None` for document-wide scans.
    pub origin: Option<StatementKind>,
}

/// Non-fatal observations recorded while building a statement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    DecodeFallback { entry: String, encoding: String },
    LossyDecode { entry: String },
    NoPreferredDocument { preferred: String, chosen: String },
    TabularDialect,
    SectionAbsent { statement: StatementKind },
    ParentSectionFallback { statement: StatementKind, start: usize, end: usize },
    AmbiguousTable { statement: StatementKind, candidates: usize, chosen_bytes: usize },
    UnparseableNumeral { field: String, raw: String },
    ComparativePeriod { requested_year: i32, document_year: i32 },
    CompositeAggregated { field: String, parts: Vec<String>, value: i64 },
    ConsolidatedFallback,
    Implausible { detail: String },
    RemoteEnhanced { fields: usize },
    RemoteUnavailable { reason: String },
}

/// Final per-document output, keyed downstream by (company, fiscal year, consolidation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub company: String,
    pub receipt_id: String,
    pub fiscal_year: i32,
    pub consolidation: ConsolidationType,
    pub fields: BTreeMap<String, i64>,
    pub sources: BTreeMap<String, Strategy>,
    pub diagnostics: Vec<Diagnostic>,
    pub dictionary_version: String,
}

impl StatementRecord {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<i64> {
        self.fields.get(field).copied()
    }

    pub fn has_diagnostic(&self, predicate: impl Fn(&Diagnostic) -> bool) -> bool {
        self.diagnostics.iter().any(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_factors_round_trip() {
        for unit in UnitMultiplier::ALL {
            assert_eq!(UnitMultiplier::from_factor(unit.factor()), Some(unit));
        }
        assert_eq!(UnitMultiplier::from_factor(10), None);
    }

    #[test]
    fn diagnostics_serialize_with_type_tag() {
        let json = serde_json::to_value(Diagnostic::SectionAbsent {
            statement: StatementKind::CashFlow,
        })
        .unwrap();
        assert_eq!(json["type"], "section_absent");
        assert_eq!(json["statement"], "cash_flow");
    }
}
