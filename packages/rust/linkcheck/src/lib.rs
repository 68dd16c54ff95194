//! Broken-link detection for scraped sections.
//!
//! This crate provides:
//! - [`resolve`]: href resolution against a page's base URL and private-host checks
//! - [`LinkChecker`]: concurrent HEAD probing with per-probe and overall deadlines

pub mod checker;
pub mod resolve;

pub use checker::{LinkChecker, ProbeOutcome};
pub use resolve::{Resolution, is_private_target, resolve_href};
