// src/utils/html_debug.rs
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::model::{StatementKind, StatementSection};
use crate::utils::error::AppError;

/// Saves the document with each located statement span wrapped in a
/// highlighted `<span>`. Overlapping spans after the first are skipped.
pub fn save_debug_html(text: &str, path: &Path, sections: &[StatementSection]) -> Result<(), AppError> {
    let mut file = File::create(path)?;
    file.write_all(render_debug_html(text, sections).as_bytes())?;
    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

pub fn render_debug_html(text: &str, sections: &[StatementSection]) -> String {
    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");
    debug_html.push_str(".highlight-balance_sheet { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-income_statement { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-cash_flow { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-fallback { outline: 2px dashed #FFA500; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut sorted: Vec<&StatementSection> = sections.iter().collect();
    sorted.sort_by_key(|s| (s.start, s.end));

    let mut last_pos = 0;
    for section in sorted {
        if section.start < last_pos || section.end > text.len() || section.start > section.end {
            tracing::debug!("Skipping overlapping highlight {}..{}", section.start, section.end);
            continue;
        }
        debug_html.push_str(&text[last_pos..section.start]);
        debug_html.push_str(&format!(
            "<span class=\"{}\" title=\"{} {} {}-{} unit x{}\">",
            css_class(section),
            section.consolidation,
            section.kind,
            section.start,
            section.end,
            section.unit.factor()
        ));
        debug_html.push_str(&text[section.start..section.end]);
        debug_html.push_str("</span>");
        last_pos = section.end;
    }
    debug_html.push_str(&text[last_pos..]);

    debug_html.push_str("\n</body>\n</html>");
    debug_html
}

fn css_class(section: &StatementSection) -> String {
    let base = match section.kind {
        StatementKind::BalanceSheet => "highlight-balance_sheet",
        StatementKind::IncomeStatement => "highlight-income_statement",
        StatementKind::CashFlow => "highlight-cash_flow",
    };
    if section.via_parent_fallback {
        format!("{} highlight-fallback", base)
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConsolidationType, UnitMultiplier};

    fn section(kind: StatementKind, start: usize, end: usize) -> StatementSection {
        StatementSection {
            kind,
            consolidation: ConsolidationType::Separate,
            start,
            end,
            unit: UnitMultiplier::Thousand,
            via_parent_fallback: false,
        }
    }

    #[test]
    fn wraps_sections_in_order() {
        let text = "head BS-BODY IS-BODY tail";
        let html = render_debug_html(
            text,
            &[
                section(StatementKind::IncomeStatement, 13, 20),
                section(StatementKind::BalanceSheet, 5, 12),
                section(StatementKind::CashFlow, 6, 8),
            ],
        );
        let bs = html.find("highlight-balance_sheet\"").unwrap();
        let is = html.find("highlight-income_statement\"").unwrap();
        assert!(bs < is);
        assert!(!html.contains("class=\"highlight-cash_flow\""));
        assert!(html.contains(">BS-BODY</span>"));
        assert!(html.contains("unit x1000"));
        assert!(html.ends_with("tail\n</body>\n</html>"));
    }
}
