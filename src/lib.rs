// src/lib.rs
//! Extraction of normalized balance-sheet, income-statement and cash-flow
//! figures from DART-style disclosure filings.

pub mod amount;
pub mod context;
pub mod dart;
pub mod dictionary;
pub mod document;
pub mod extractors;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use context::{CompanyDirectory, RunContext};
pub use dictionary::AccountDictionary;
pub use document::{DocumentMetadata, SourceDocument};
pub use model::{ConsolidationType, Diagnostic, StatementKind, StatementRecord, Strategy, UnitMultiplier};
pub use pipeline::{ExtractionRequest, Pipeline};
