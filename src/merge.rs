// src/merge.rs
//! Priority merge of strategy results and composed-field aggregation.

use std::collections::BTreeMap;

use crate::dictionary::ComposedField;
use crate::model::{Diagnostic, ExtractedField, Strategy};

/// Accumulates field values in priority order: whatever is absorbed first
/// stays, later strategies only fill gaps.
#[derive(Debug, Default)]
pub struct Merger {
    fields: BTreeMap<String, i64>,
    sources: BTreeMap<String, Strategy>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary results (text pattern or tabular). Within one batch the first
    /// value per field wins.
    pub fn absorb(&mut self, fields: impl IntoIterator<Item = ExtractedField>) -> usize {
        self.fill_gaps(fields)
    }

    /// Inserts only fields that are still unset; returns how many were added.
    pub fn fill_gaps(&mut self, fields: impl IntoIterator<Item = ExtractedField>) -> usize {
        let mut added = 0;
        for f in fields {
            if self.fields.contains_key(&f.field) {
                tracing::trace!("{} already set; ignoring {:?} value {}", f.field, f.strategy, f.value);
                continue;
            }
            self.sources.insert(f.field.clone(), f.strategy);
            self.fields.insert(f.field, f.value);
            added += 1;
        }
        added
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Applies the composed-field table. An unset parent becomes the sum of the
    /// absolute values of its present parts; the parts are always removed.
    pub fn aggregate(&mut self, composed: &[ComposedField], diagnostics: &mut Vec<Diagnostic>) {
        for rule in composed {
            let present: Vec<(String, i64)> = rule
                .parts
                .iter()
                .filter_map(|p| self.fields.get(p).map(|v| (p.clone(), *v)))
                .collect();
            if present.is_empty() {
                continue;
            }

            if !self.fields.contains_key(&rule.parent) {
                let value = present
                    .iter()
                    .fold(0i64, |acc, (_, v)| acc.saturating_add(v.saturating_abs()));
                let strategy = present
                    .first()
                    .and_then(|(p, _)| self.sources.get(p).copied())
                    .unwrap_or(Strategy::TextPattern);
                tracing::debug!("{} = sum of |{:?}| = {}", rule.parent, present, value);
                self.fields.insert(rule.parent.clone(), value);
                self.sources.insert(rule.parent.clone(), strategy);
                diagnostics.push(Diagnostic::CompositeAggregated {
                    field: rule.parent.clone(),
                    parts: present.iter().map(|(p, _)| p.clone()).collect(),
                    value,
                });
            }

            for (part, _) in &present {
                self.fields.remove(part);
                self.sources.remove(part);
            }
        }
    }

    pub fn into_parts(self) -> (BTreeMap<String, i64>, BTreeMap<String, Strategy>) {
        (self.fields, self.sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, value: i64, strategy: Strategy) -> ExtractedField {
        ExtractedField {
            field: name.to_string(),
            value,
            strategy,
            origin: None,
        }
    }

    fn capex_rule() -> Vec<ComposedField> {
        vec![ComposedField {
            parent: "capex".to_string(),
            parts: vec![
                "acquisition_of_ppe".to_string(),
                "acquisition_of_intangibles".to_string(),
                "acquisition_of_investment_property".to_string(),
            ],
        }]
    }

    #[test]
    fn primary_values_are_never_overwritten() {
        let mut merger = Merger::new();
        merger.absorb(vec![field("total_assets", 100, Strategy::TextPattern)]);
        let added = merger.fill_gaps(vec![
            field("total_assets", 999, Strategy::StructuredCode),
            field("total_equity", 40, Strategy::StructuredCode),
        ]);
        assert_eq!(added, 1);
        let (fields, sources) = merger.into_parts();
        assert_eq!(fields["total_assets"], 100);
        assert_eq!(sources["total_assets"], Strategy::TextPattern);
        assert_eq!(fields["total_equity"], 40);
        assert_eq!(sources["total_equity"], Strategy::StructuredCode);
    }

    #[test]
    fn parts_sum_absolute_values_and_are_dropped() {
        let mut merger = Merger::new();
        merger.absorb(vec![
            field("acquisition_of_ppe", 10, Strategy::TextPattern),
            field("acquisition_of_intangibles", -5, Strategy::TextPattern),
            field("acquisition_of_investment_property", 20, Strategy::TextPattern),
        ]);
        let mut diags = Vec::new();
        merger.aggregate(&capex_rule(), &mut diags);
        let (fields, _) = merger.into_parts();
        assert_eq!(fields.get("capex"), Some(&35));
        assert!(!fields.contains_key("acquisition_of_ppe"));
        assert!(!fields.contains_key("acquisition_of_intangibles"));
        assert!(!fields.contains_key("acquisition_of_investment_property"));
        assert!(matches!(diags.as_slice(), [Diagnostic::CompositeAggregated { value: 35, .. }]));
    }

    #[test]
    fn existing_parent_is_kept_and_parts_still_dropped() {
        let mut merger = Merger::new();
        merger.absorb(vec![
            field("capex", -70, Strategy::TextPattern),
            field("acquisition_of_ppe", 10, Strategy::TextPattern),
        ]);
        let mut diags = Vec::new();
        merger.aggregate(&capex_rule(), &mut diags);
        let (fields, _) = merger.into_parts();
        assert_eq!(fields.get("capex"), Some(&-70));
        assert!(!fields.contains_key("acquisition_of_ppe"));
        assert!(diags.is_empty());
    }
}
