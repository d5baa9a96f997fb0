// src/dart/models.rs
use serde::Deserialize;

use crate::model::ConsolidationType;

/// Response envelope of the single-company key-accounts endpoint
/// (`fnlttSinglAcnt.json`).
#[derive(Debug, Deserialize)]
pub struct KeyAccountResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub list: Vec<KeyAccount>,
}

/// One named total as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyAccount {
    pub account_nm: String,
    /// `OFS` (separate) or `CFS` (consolidated).
    pub fs_div: String,
    #[serde(default)]
    pub sj_div: String,
    #[serde(default)]
    pub bsns_year: String,
    /// Current-period amount, comma formatted, base currency units.
    #[serde(default)]
    pub thstrm_amount: Option<String>,
}

impl KeyAccount {
    pub fn consolidation(&self) -> Option<ConsolidationType> {
        match self.fs_div.as_str() {
            "OFS" => Some(ConsolidationType::Separate),
            "CFS" => Some(ConsolidationType::Consolidated),
            _ => None,
        }
    }
}

// "000" is success, "013" means no data for the query.
pub const STATUS_OK: &str = "000";
pub const STATUS_NO_DATA: &str = "013";

// Report code of the annual business report.
pub const ANNUAL_REPORT_CODE: &str = "11011";
