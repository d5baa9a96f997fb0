// src/document/mod.rs
pub mod decode;
pub mod loader;

pub use loader::{load_archive, load_markup, DocumentMetadata, SourceDocument};
