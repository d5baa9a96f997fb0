// src/document/loader.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::document::decode::{decode_bytes, has_keyword, Decoded};
use crate::model::Diagnostic;
use crate::utils::config::EngineConfig;
use crate::utils::error::LoadError;
use crate::utils::text::collapse_whitespace;

const MARKUP_EXTENSIONS: [&str; 4] = [".xml", ".htm", ".html", ".txt"];

static DOCUMENT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<DOCUMENT-NAME\b([^>]*)>([^<]*)"#).expect("Failed to compile DOCUMENT_NAME_RE")
});

static ACODE_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bACODE\s*=\s*"([^"]*)""#).expect("Failed to compile ACODE_ATTR_RE"));

/// What the caller knows about a filing before opening it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub filer_code: String,
    pub receipt_id: String,
    pub report_title: Option<String>,
    pub submission_date: Option<NaiveDate>,
    /// Overrides the configured preferred document-type code.
    pub type_code_hint: Option<String>,
}

/// One decoded filing document, created per archive open.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub metadata: DocumentMetadata,
    pub entry_name: String,
    pub raw_bytes: Vec<u8>,
    pub text: String,
    /// Declared in `<DOCUMENT-NAME ACODE="…">`.
    pub type_code: Option<String>,
    pub declared_title: Option<String>,
    pub encoding: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl SourceDocument {
    /// Caller-supplied title, else the one declared inside the document.
    pub fn report_title(&self) -> Option<&str> {
        self.metadata
            .report_title
            .as_deref()
            .or(self.declared_title.as_deref())
    }
}

/// Declared document-type code and title, if the markup carries them.
pub fn declared_document(text: &str) -> (Option<String>, Option<String>) {
    let Some(caps) = DOCUMENT_NAME_RE.captures(text) else {
        return (None, None);
    };
    let code = caps
        .get(1)
        .and_then(|attrs| ACODE_ATTR_RE.captures(attrs.as_str()))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|c| !c.is_empty());
    let title = caps
        .get(2)
        .map(|m| collapse_whitespace(&html_escape::decode_html_entities(m.as_str())))
        .filter(|t| !t.is_empty());
    (code, title)
}

fn is_markup_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    MARKUP_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn decode_diagnostics(entry: &str, decoded: &Decoded) -> Vec<Diagnostic> {
    if decoded.lossy {
        vec![Diagnostic::LossyDecode {
            entry: entry.to_string(),
        }]
    } else if decoded.fallback {
        vec![Diagnostic::DecodeFallback {
            entry: entry.to_string(),
            encoding: decoded.encoding.clone(),
        }]
    } else {
        Vec::new()
    }
}

fn build_document(metadata: DocumentMetadata, entry_name: String, raw_bytes: Vec<u8>, decoded: Decoded) -> SourceDocument {
    let (type_code, declared_title) = declared_document(&decoded.text);
    let diagnostics = decode_diagnostics(&entry_name, &decoded);
    SourceDocument {
        metadata,
        entry_name,
        raw_bytes,
        text: decoded.text,
        type_code,
        declared_title,
        encoding: decoded.encoding,
        diagnostics,
    }
}

/// Opens a filing archive and selects its most relevant markup document.
///
/// Every markup entry is decoded and probed for domain keywords; entries
/// without any are skipped, as are entries that cannot be read. Among the
/// rest, the first declaring the preferred type code wins, else the largest
/// by raw size (ties go to the earlier entry).
pub fn load_archive(bytes: &[u8], metadata: DocumentMetadata, config: &EngineConfig) -> Result<SourceDocument, LoadError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut candidates: Vec<SourceDocument> = Vec::new();

    for i in 0..archive.len() {
        let mut zip_file = match archive.by_index(i) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry #{} in {}: {}", i, metadata.receipt_id, e);
                continue;
            }
        };
        if zip_file.is_dir() || !is_markup_entry(zip_file.name()) {
            continue;
        }
        let name = zip_file.name().to_string();
        let mut raw = Vec::new();
        if let Err(e) = zip_file.read_to_end(&mut raw) {
            tracing::warn!("Skipping entry {} of {}: {}", name, metadata.receipt_id, e);
            continue;
        }

        let decoded = decode_bytes(&raw, &config.encodings, &config.keyword_probes);
        if !has_keyword(&decoded.text, &config.keyword_probes) {
            tracing::debug!("Entry {} has no domain keyword; skipped", name);
            continue;
        }
        tracing::debug!("Entry {} decoded as {} ({} bytes)", name, decoded.encoding, raw.len());
        candidates.push(build_document(metadata.clone(), name, raw, decoded));
    }

    let preferred = metadata
        .type_code_hint
        .clone()
        .or_else(|| config.preferred_type_code.clone());
    select_document(candidates, preferred.as_deref()).ok_or(LoadError::NoContent(metadata.receipt_id))
}

fn select_document(candidates: Vec<SourceDocument>, preferred: Option<&str>) -> Option<SourceDocument> {
    if let Some(code) = preferred {
        if let Some(idx) = candidates.iter().position(|d| d.type_code.as_deref() == Some(code)) {
            let doc = candidates.into_iter().nth(idx)?;
            tracing::info!("Selected {} (type {})", doc.entry_name, code);
            return Some(doc);
        }
    }

    let mut best: Option<SourceDocument> = None;
    for doc in candidates {
        if best.as_ref().map_or(true, |b| doc.raw_bytes.len() > b.raw_bytes.len()) {
            best = Some(doc);
        }
    }
    let mut doc = best?;
    tracing::info!("Selected {} by size ({} bytes)", doc.entry_name, doc.raw_bytes.len());
    if let Some(code) = preferred {
        doc.diagnostics.push(Diagnostic::NoPreferredDocument {
            preferred: code.to_string(),
            chosen: doc.entry_name.clone(),
        });
    }
    Some(doc)
}

/// Loads a bare markup document (not wrapped in an archive).
pub fn load_markup(bytes: &[u8], metadata: DocumentMetadata, config: &EngineConfig) -> Result<SourceDocument, LoadError> {
    let decoded = decode_bytes(bytes, &config.encodings, &config.keyword_probes);
    if !has_keyword(&decoded.text, &config.keyword_probes) {
        return Err(LoadError::NoContent(metadata.receipt_id));
    }
    let entry_name = format!("{}.xml", metadata.receipt_id);
    Ok(build_document(metadata, entry_name, bytes.to_vec(), decoded))
}
