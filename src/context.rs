// src/context.rs
//! Read-only state shared by every document of a run.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::dictionary::AccountDictionary;
use crate::utils::config::EngineConfig;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompanyEntry {
    pub filer_code: String,
    /// Registry code used by the remote facts API.
    pub corp_code: String,
    #[serde(default)]
    pub name: String,
}

/// Filer code to registry code lookup, built once per run.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    by_filer: HashMap<String, CompanyEntry>,
}

impl CompanyDirectory {
    pub fn from_entries(entries: impl IntoIterator<Item = CompanyEntry>) -> Self {
        let by_filer = entries
            .into_iter()
            .map(|e| (e.filer_code.clone(), e))
            .collect();
        Self { by_filer }
    }

    /// Reads a JSON list of `{filer_code, corp_code, name}` objects.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<CompanyEntry> = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("Company list {}: {}", path.display(), e)))?;
        tracing::info!("Loaded {} companies from {}", entries.len(), path.display());
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, filer_code: &str) -> Option<&CompanyEntry> {
        self.by_filer.get(filer_code)
    }

    pub fn corp_code(&self, filer_code: &str) -> Option<&str> {
        self.get(filer_code).map(|e| e.corp_code.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_filer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_filer.is_empty()
    }
}

/// Dictionary, company lookup and configuration for one batch run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub dictionary: Arc<AccountDictionary>,
    pub companies: Arc<CompanyDirectory>,
    pub config: EngineConfig,
}

impl RunContext {
    pub fn new(dictionary: AccountDictionary, companies: CompanyDirectory, config: EngineConfig) -> Self {
        Self {
            dictionary: Arc::new(dictionary),
            companies: Arc::new(companies),
            config,
        }
    }

    /// Built-in dictionary unless `dictionary_path` is given; empty company list unless `companies_path` is.
    pub fn load(
        dictionary_path: Option<&Path>,
        companies_path: Option<&Path>,
        config: EngineConfig,
    ) -> Result<Self, AppError> {
        let dictionary = match dictionary_path {
            Some(path) => AccountDictionary::from_path(path)?,
            None => AccountDictionary::builtin()?,
        };
        let companies = match companies_path {
            Some(path) => CompanyDirectory::from_path(path)?,
            None => CompanyDirectory::default(),
        };
        tracing::info!(
            "Run context ready: dictionary {} ({} fields), {} companies",
            dictionary.version(),
            dictionary.fields().len(),
            companies.len()
        );
        Ok(Self::new(dictionary, companies, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_directory_from_json() {
        let dir = std::env::temp_dir().join(format!("fsx_companies_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("companies.json");
        std::fs::write(
            &path,
            r#"[{"filer_code": "005930", "corp_code": "00126380", "name": "삼성전자"},
                {"filer_code": "000660", "corp_code": "00164779"}]"#,
        )
        .unwrap();

        let companies = CompanyDirectory::from_path(&path).unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies.corp_code("005930"), Some("00126380"));
        assert_eq!(companies.get("000660").map(|c| c.name.as_str()), Some(""));
        assert_eq!(companies.corp_code("999999"), None);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(CompanyDirectory::from_path(&path), Err(AppError::Config(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn default_context_uses_builtin_dictionary() {
        let ctx = RunContext::load(None, None, EngineConfig::default()).unwrap();
        assert!(ctx.dictionary.field("total_assets").is_some());
        assert!(ctx.companies.is_empty());
    }
}
