// src/extractors/mod.rs
pub mod section;
pub mod structured;
pub mod tabular;
pub mod text_pattern;
pub mod unit;

// Re-export key extraction types for convenience
pub use section::{LocatedSection, SectionLocator, TitlePattern};
pub use structured::{extract_structured_fields, first_current_year};
pub use tabular::{extract_tabular, is_tabular_dialect, TabularOutcome};
pub use text_pattern::extract_text_fields;
pub use unit::{detect_unit, detect_unit_signal};
