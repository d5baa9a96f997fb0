// src/utils/config.rs
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::error::AppError;

/// Tunables for one extraction run. Loaded from an optional JSON file and then
/// overridden by `FSX_*` environment variables; the CLI applies its own flags last.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Characters from the start of a section (or table window) scanned for a unit declaration.
    pub unit_scan_window: usize,
    /// Tables smaller than this are only chosen when nothing larger qualifies.
    pub min_table_bytes: usize,
    /// Window length used when re-scoping a parent "financial statements" span.
    pub rescope_window: usize,
    /// Keyword probes a decoded entry must contain to count as a financial document.
    pub keyword_probes: Vec<String>,
    /// Encoding labels tried in order (WHATWG labels, see encoding_rs).
    pub encodings: Vec<String>,
    /// Document-type code preferred when an archive holds several documents.
    pub preferred_type_code: Option<String>,
    /// Document-type codes that render statements as HTML tables.
    pub tabular_type_codes: Vec<String>,
    /// Pause before each remote API call.
    pub remote_delay_ms: u64,
    /// Upper bound for a single remote API call.
    pub remote_timeout_secs: u64,
    pub remote_base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unit_scan_window: 3_000,
            min_table_bytes: 2_000,
            rescope_window: 16_000,
            keyword_probes: ["재무", "자산", "부채", "매출", "손익", "이익", "현금흐름"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            encodings: ["utf-8", "euc-kr", "utf-16le", "utf-16be"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            preferred_type_code: Some("11011".to_string()),
            tabular_type_codes: vec!["00760".to_string(), "00761".to_string()],
            remote_delay_ms: 1_000,
            remote_timeout_secs: 10,
            remote_base_url: "https://opendart.fss.or.kr/api".to_string(),
            api_key: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file (if given) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw).map_err(|e| {
                    AppError::Config(format!("Invalid config file {}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Applies `FSX_*` and `DART_API_KEY` environment variables on top of the current values.
    pub fn apply_env(&mut self) -> Result<(), AppError> {
        if let Some(v) = env_number("FSX_UNIT_SCAN_WINDOW")? {
            self.unit_scan_window = v as usize;
        }
        if let Some(v) = env_number("FSX_MIN_TABLE_BYTES")? {
            self.min_table_bytes = v as usize;
        }
        if let Some(v) = env_number("FSX_RESCOPE_WINDOW")? {
            self.rescope_window = v as usize;
        }
        if let Some(v) = env_number("FSX_REMOTE_DELAY_MS")? {
            self.remote_delay_ms = v;
        }
        if let Some(v) = env_number("FSX_REMOTE_TIMEOUT_SECS")? {
            self.remote_timeout_secs = v;
        }
        if let Ok(key) = std::env::var("DART_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key.trim().to_string());
            }
        }
        tracing::debug!("Effective engine config: {:?}", self);
        Ok(())
    }

    pub fn remote_delay(&self) -> Duration {
        Duration::from_millis(self.remote_delay_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

fn env_number(name: &str) -> Result<Option<u64>, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}
