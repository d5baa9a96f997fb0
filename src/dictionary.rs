// src/dictionary.rs
//! Versioned account alias dictionary.
//!
//! Canonical fields, their ordered label aliases, statement titles, structured
//! codes, composed fields and the remote-API alias table all live in
//! `data/accounts.json`. The list order of aliases is their priority and is a
//! tie-break policy; nothing reorders it at runtime.

use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::extractors::section::TitlePattern;
use crate::extractors::text_pattern::alias_regex;
use crate::model::{ConsolidationType, StatementKind};
use crate::utils::error::DictionaryError;
use crate::utils::text::compact;

const BUILTIN_DICTIONARY: &str = include_str!("../data/accounts.json");

// --- Raw (on-disk) shape ---

#[derive(Debug, Deserialize)]
struct RawDictionary {
    version: String,
    sections: Vec<RawSection>,
    parent_sections: RawParentSections,
    #[serde(default)]
    terminators: Vec<String>,
    accounts: Vec<RawAccount>,
    #[serde(default)]
    composed: Vec<ComposedField>,
    #[serde(default)]
    structured_codes: BTreeMap<String, String>,
    #[serde(default)]
    remote_aliases: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    statement: StatementKind,
    separate: Vec<String>,
    consolidated: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawParentSections {
    separate: Vec<String>,
    consolidated: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    field: String,
    statement: StatementKind,
    aliases: Vec<String>,
}

// --- Compiled shape ---

/// One `(field, alias, priority)` triple; priority 0 is tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasEntry {
    pub field: String,
    pub alias: String,
    pub priority: usize,
    pub statement: StatementKind,
}

#[derive(Debug, Clone)]
pub struct CompiledAlias {
    pub text: String,
    /// Alias with whitespace removed, used for table-cell matching.
    pub compact: String,
    /// Label + optional footnote + first qualifying numeral.
    pub pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub statement: StatementKind,
    pub aliases: Vec<CompiledAlias>,
}

/// A parent field that may be reported as several sub-accounts instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComposedField {
    pub parent: String,
    pub parts: Vec<String>,
}

#[derive(Debug, Clone)]
struct SectionTitles {
    statement: StatementKind,
    separate: Vec<TitlePattern>,
    consolidated: Vec<TitlePattern>,
}

#[derive(Debug, Clone)]
pub struct AccountDictionary {
    version: String,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    sections: Vec<SectionTitles>,
    parent_separate: Vec<TitlePattern>,
    parent_consolidated: Vec<TitlePattern>,
    terminators: Vec<TitlePattern>,
    composed: Vec<ComposedField>,
    structured_codes: BTreeMap<String, String>,
    remote_aliases: BTreeMap<String, String>,
}

impl AccountDictionary {
    /// The dictionary shipped with the crate.
    pub fn builtin() -> Result<Self, DictionaryError> {
        Self::from_json_str(BUILTIN_DICTIONARY)
    }

    pub fn from_path(path: &Path) -> Result<Self, DictionaryError> {
        let raw = std::fs::read_to_string(path)?;
        let dictionary = Self::from_json_str(&raw)?;
        tracing::info!(
            "Loaded account dictionary {} from {} ({} fields)",
            dictionary.version,
            path.display(),
            dictionary.fields.len()
        );
        Ok(dictionary)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, DictionaryError> {
        let raw: RawDictionary = serde_json::from_str(raw)?;

        let mut fields = Vec::with_capacity(raw.accounts.len());
        let mut index = HashMap::new();
        // compact alias -> owning field
        let mut alias_owner: HashMap<String, String> = HashMap::new();

        for account in raw.accounts {
            if index.contains_key(&account.field) {
                return Err(DictionaryError::DuplicateField(account.field));
            }
            let mut aliases = Vec::with_capacity(account.aliases.len());
            for alias in &account.aliases {
                let key = compact(alias);
                match alias_owner.get(&key) {
                    Some(owner) if owner != &account.field => {
                        return Err(DictionaryError::AliasCollision {
                            alias: alias.clone(),
                            first: owner.clone(),
                            second: account.field.clone(),
                        });
                    }
                    _ => {
                        alias_owner.insert(key.clone(), account.field.clone());
                    }
                }
                let pattern = alias_regex(alias)
                    .map_err(|e| DictionaryError::Regex(alias.clone(), e.to_string()))?;
                aliases.push(CompiledAlias {
                    text: alias.clone(),
                    compact: key,
                    pattern,
                });
            }
            index.insert(account.field.clone(), fields.len());
            fields.push(FieldSpec {
                name: account.field,
                statement: account.statement,
                aliases,
            });
        }

        let known = |context: &str, field: &str| -> Result<(), DictionaryError> {
            if index.contains_key(field) {
                Ok(())
            } else {
                Err(DictionaryError::UnknownField {
                    context: context.to_string(),
                    field: field.to_string(),
                })
            }
        };
        for composed in &raw.composed {
            known("composed parent", &composed.parent)?;
            for part in &composed.parts {
                known(&format!("composed part of {}", composed.parent), part)?;
            }
        }
        for (code, field) in &raw.structured_codes {
            known(&format!("structured code {}", code), field)?;
        }
        for (name, field) in &raw.remote_aliases {
            known(&format!("remote alias {}", name), field)?;
        }

        let sections = raw
            .sections
            .iter()
            .map(|s| {
                Ok(SectionTitles {
                    statement: s.statement,
                    separate: compile_titles(&s.separate)?,
                    consolidated: compile_titles(&s.consolidated)?,
                })
            })
            .collect::<Result<Vec<_>, DictionaryError>>()?;

        let remote_aliases = raw
            .remote_aliases
            .into_iter()
            .map(|(name, field)| (compact(&name), field))
            .collect();

        Ok(Self {
            version: raw.version,
            fields,
            index,
            sections,
            parent_separate: compile_titles(&raw.parent_sections.separate)?,
            parent_consolidated: compile_titles(&raw.parent_sections.consolidated)?,
            terminators: compile_titles(&raw.terminators)?,
            composed: raw.composed,
            structured_codes: raw.structured_codes,
            remote_aliases,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Fields of one statement kind, in dictionary order.
    pub fn fields_for(&self, kind: StatementKind) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(move |f| f.statement == kind)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn statement_of(&self, name: &str) -> Option<StatementKind> {
        self.field(name).map(|f| f.statement)
    }

    /// Flattened `(field, alias, priority)` view in evaluation order.
    pub fn entries(&self) -> Vec<AliasEntry> {
        self.fields
            .iter()
            .flat_map(|f| {
                f.aliases.iter().enumerate().map(move |(priority, a)| AliasEntry {
                    field: f.name.clone(),
                    alias: a.text.clone(),
                    priority,
                    statement: f.statement,
                })
            })
            .collect()
    }

    pub fn titles(&self, kind: StatementKind, consolidation: ConsolidationType) -> &[TitlePattern] {
        self.sections
            .iter()
            .find(|s| s.statement == kind)
            .map(|s| match consolidation {
                ConsolidationType::Separate => s.separate.as_slice(),
                ConsolidationType::Consolidated => s.consolidated.as_slice(),
            })
            .unwrap_or(&[])
    }

    pub fn parent_titles(&self, consolidation: ConsolidationType) -> &[TitlePattern] {
        match consolidation {
            ConsolidationType::Separate => &self.parent_separate,
            ConsolidationType::Consolidated => &self.parent_consolidated,
        }
    }

    pub fn terminators(&self) -> &[TitlePattern] {
        &self.terminators
    }

    pub fn composed(&self) -> &[ComposedField] {
        &self.composed
    }

    pub fn field_for_code(&self, code: &str) -> Option<&str> {
        self.structured_codes.get(code).map(String::as_str)
    }

    /// Maps a remote API account name (spacing ignored) onto a canonical field.
    pub fn remote_field(&self, account_name: &str) -> Option<&str> {
        self.remote_aliases.get(&compact(account_name)).map(String::as_str)
    }

    /// Maps a table row label onto a field of `kind`: exact alias match first,
    /// then the longest alias that is a prefix or suffix of the label
    /// (earlier dictionary entries win ties).
    pub fn match_label(&self, label: &str, kind: StatementKind) -> Option<&str> {
        let label = compact(label);
        if label.is_empty() {
            return None;
        }
        if let Some(field) = self
            .fields_for(kind)
            .find(|f| f.aliases.iter().any(|a| a.compact == label))
        {
            return Some(field.name.as_str());
        }

        let mut best: Option<(&str, usize)> = None;
        for field in self.fields_for(kind) {
            for alias in &field.aliases {
                let hit = label.starts_with(&alias.compact) || label.ends_with(&alias.compact);
                let len = alias.compact.chars().count();
                if hit && best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((field.name.as_str(), len));
                }
            }
        }
        best.map(|(name, _)| name)
    }
}

fn compile_titles(literals: &[String]) -> Result<Vec<TitlePattern>, DictionaryError> {
    literals
        .iter()
        .map(|l| TitlePattern::new(l).map_err(|e| DictionaryError::Regex(l.clone(), e.to_string())))
        .collect()
}
