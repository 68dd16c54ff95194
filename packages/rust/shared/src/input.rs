//! Loading scraped sections from the scraper's JSON payload.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{PagewiseError, Result};
use crate::types::Section;

/// Parse and validate a scrape payload.
///
/// The payload must be a JSON array of sections. A scraper failure arrives as
/// an object with an `error` key and is reported as such. Every section needs
/// a non-empty id, unique within the payload.
pub fn load_sections(json: &str) -> Result<Vec<Section>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| PagewiseError::input(format!("scrape payload is not valid JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => {
            return Err(match map.get("error") {
                Some(err) => PagewiseError::input(format!(
                    "scraper reported an error: {}",
                    err.as_str().map(String::from).unwrap_or_else(|| err.to_string())
                )),
                None => PagewiseError::input("scrape payload must be an array of sections"),
            });
        }
        other => {
            return Err(PagewiseError::input(format!(
                "scrape payload must be an array of sections, got {}",
                json_kind(&other)
            )));
        }
    };

    let sections = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<Section>(item).map_err(|e| {
                PagewiseError::input(format!("section at index {i} is malformed: {e}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    validate_sections(&sections)?;

    tracing::debug!(count = sections.len(), "loaded sections");
    Ok(sections)
}

/// Check that every section has a non-empty id, unique within the batch.
pub fn validate_sections(sections: &[Section]) -> Result<()> {
    let mut seen = HashSet::new();
    for (i, section) in sections.iter().enumerate() {
        if section.id.trim().is_empty() {
            return Err(PagewiseError::validation(format!(
                "section at index {i} has an empty id"
            )));
        }
        if !seen.insert(section.id.as_str()) {
            return Err(PagewiseError::validation(format!(
                "duplicate section id '{}'",
                section.id
            )));
        }
    }
    Ok(())
}

/// Read a scrape payload from disk and parse it with [`load_sections`].
pub fn load_sections_from(path: &Path) -> Result<Vec<Section>> {
    let content = std::fs::read_to_string(path).map_err(|e| PagewiseError::io(path, e))?;
    load_sections(&content)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
