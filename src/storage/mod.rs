// src/storage/mod.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::StatementRecord;
use crate::utils::error::StorageError;

/// What an upsert changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub path: PathBuf,
    /// Fields written because they were previously unset.
    pub inserted: usize,
    /// Incoming fields ignored because a value was already stored.
    pub preserved: usize,
}

/// Persistence contract keyed by (company, fiscal year, consolidation).
/// Re-processing a document only ever fills fields that are still null.
pub trait StatementStore {
    fn upsert(&self, record: &StatementRecord) -> Result<UpsertOutcome, StorageError>;
    fn load(&self, company: &str, fiscal_year: i32, consolidation: &str) -> Result<Option<StatementRecord>, StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    updated_at: DateTime<Utc>,
    record: StatementRecord,
}

/// One JSON file per key: `<base>/<company>/<year>/<consolidation>.json`.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a new store rooted at `base_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }
        Ok(Self { base_dir: base_path })
    }

    fn record_path(&self, company: &str, fiscal_year: i32, consolidation: &str) -> PathBuf {
        self.base_dir
            .join(company)
            .join(fiscal_year.to_string())
            .join(format!("{}.json", consolidation))
    }
}

impl StatementStore for JsonFileStore {
    fn load(&self, company: &str, fiscal_year: i32, consolidation: &str) -> Result<Option<StatementRecord>, StorageError> {
        let path = self.record_path(company, fiscal_year, consolidation);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(StorageError::IoError)?;
        let stored: StoredRecord =
            serde_json::from_str(&raw).map_err(|e| StorageError::SerializationError(e.to_string()))?;
        Ok(Some(stored.record))
    }

    fn upsert(&self, record: &StatementRecord) -> Result<UpsertOutcome, StorageError> {
        let consolidation = record.consolidation.as_str();
        let path = self.record_path(&record.company, record.fiscal_year, consolidation);

        let (merged, inserted, preserved) = match self.load(&record.company, record.fiscal_year, consolidation)? {
            Some(mut existing) => {
                let mut inserted = 0;
                let mut preserved = 0;
                for (field, value) in &record.fields {
                    if existing.fields.contains_key(field) {
                        preserved += 1;
                        continue;
                    }
                    existing.fields.insert(field.clone(), *value);
                    if let Some(source) = record.sources.get(field) {
                        existing.sources.insert(field.clone(), *source);
                    }
                    inserted += 1;
                }
                existing.receipt_id = record.receipt_id.clone();
                existing.diagnostics = record.diagnostics.clone();
                existing.dictionary_version = record.dictionary_version.clone();
                (existing, inserted, preserved)
            }
            None => (record.clone(), record.fields.len(), 0),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StorageError::IoError)?;
        }
        let stored = StoredRecord {
            updated_at: Utc::now(),
            record: merged,
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&path, json).map_err(StorageError::IoError)?;

        tracing::info!(
            "Upserted {} ({} inserted, {} preserved)",
            path.display(),
            inserted,
            preserved
        );
        Ok(UpsertOutcome {
            path,
            inserted,
            preserved,
        })
    }
}
