// src/utils/error.rs
use thiserror::Error;

/// Failures while opening an archive or decoding its entries.
/// Scoped to a single document; the caller decides whether to skip it.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Archive could not be opened: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No content entry could be decoded in {0}")]
    NoContent(String),
}

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("I/O error reading dictionary: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed dictionary data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Canonical field '{0}' is defined more than once")]
    DuplicateField(String),

    #[error("Alias '{alias}' is listed under both '{first}' and '{second}'")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },

    #[error("{context} refers to unknown field '{field}'")]
    UnknownField { context: String, field: String },

    #[error("Pattern for '{0}' failed to compile: {1}")]
    Regex(String, String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Document unreadable: {0}")]
    Load(#[from] LoadError),

    #[error("Fiscal year could not be resolved for receipt {0}")]
    UnknownFiscalYear(String),
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("API returned status {status}: {message}")]
    Api { status: String, message: String },

    #[error("Remote call timed out")]
    Timeout,

    #[error("No API key configured")]
    MissingApiKey,

    #[error("No company code known for filer {0}")]
    UnknownCompany(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Remote fallback failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
