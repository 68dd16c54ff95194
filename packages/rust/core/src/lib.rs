//! Core pipeline orchestration and domain logic for pagewise.
//!
//! This crate ties together retrieval, prompting, the model client, and
//! response parsing into per-task runs over a page's sections
//! (see [`Pipeline::run`]).

pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod response;

pub use model::{ChatCompletionClient, CompletionModel};
pub use pipeline::{
    Pipeline, PipelineConfig, ProgressReporter, SectionLinkCheck, SilentProgress,
    check_section_links,
};
pub use prompt::{GENERAL_KNOWLEDGE, build_prompt};
pub use report::AnalysisReport;
pub use response::{ParseFailure, extract_object, parse_repair_list};
