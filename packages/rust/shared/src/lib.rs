//! Shared types, error model, and configuration for pagewise.
//!
//! This crate is the foundation depended on by all other pagewise crates.
//! It provides:
//! - [`PagewiseError`]: the unified error type
//! - Domain types ([`Section`], [`Link`], [`AnalysisRecord`], [`Task`])
//! - Configuration ([`AppConfig`], config loading, API key validation)
//! - Section loading from the scraper's JSON payload

pub mod config;
pub mod error;
pub mod input;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EmbeddingConfig, LinkCheckConfig, ModelConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_keys,
};
pub use error::{PagewiseError, Result};
pub use input::{load_sections, load_sections_from, validate_sections};
pub use types::{
    AdditionSuggestion, AdditionSuggestions, Analysis, AnalysisFailure, AnalysisRecord,
    BrokenLink, Link, LinkRepair, LinkReplacement, RepairEntry, Section, Step, Task, UpdateCheck,
};
