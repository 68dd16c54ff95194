//! Extracting structured payloads from free-form model replies.
//!
//! Models are told to answer with a single JSON payload but often wrap it in
//! prose or code fences, or emit several brace-delimited fragments. Nothing
//! here panics; failure is a value.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use pagewise_shared::{LinkReplacement, RepairEntry};

/// Why no structured payload could be taken from a reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    /// No brace-delimited span decoded into the expected shape.
    #[error("No valid structured object found in model response")]
    NoStructuredObject,
}

/// Decode the first brace-delimited span of `raw` that matches `T`.
///
/// Candidates are tried in order of their opening brace, so an enclosing
/// object is tried before the objects nested inside it.
pub fn extract_object<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    Candidates::new(raw)
        .find_map(|span| serde_json::from_str::<T>(span).ok())
        .ok_or(ParseFailure::NoStructuredObject)
}

/// Parse a link-repair reply: the whole reply must be a JSON array of
/// replacements, optionally inside a Markdown code fence.
///
/// A reply that does not parse yields a single [`RepairEntry::Failed`].
pub fn parse_repair_list(raw: &str) -> Vec<RepairEntry> {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<Vec<LinkReplacement>>(body) {
        Ok(replacements) => replacements
            .into_iter()
            .map(RepairEntry::Replacement)
            .collect(),
        Err(e) => vec![RepairEntry::Failed {
            error: format!("model reply is not a list of link replacements: {e}"),
        }],
    }
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```$").expect("valid regex")
    });

    let trimmed = raw.trim();
    FENCE_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed)
}

// ---------------------------------------------------------------------------
// Candidate scanner
// ---------------------------------------------------------------------------

/// Iterator over balanced `{ ... }` spans, one per opening brace.
///
/// Braces inside JSON string literals are ignored. An opening brace that is
/// never closed produces no candidate.
pub struct Candidates<'a> {
    raw: &'a str,
    pos: usize,
}

impl<'a> Candidates<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw, pos: 0 }
    }
}

impl<'a> Iterator for Candidates<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(offset) = self.raw.get(self.pos..)?.find('{') {
            let open = self.pos + offset;
            self.pos = open + 1;
            if let Some(len) = balanced_len(&self.raw.as_bytes()[open..]) {
                return Some(&self.raw[open..open + len]);
            }
        }
        self.pos = self.raw.len();
        None
    }
}

/// Length of the balanced object starting at `bytes[0] == b'{'`.
fn balanced_len(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagewise_shared::{AdditionSuggestions, UpdateCheck};

    #[test]
    fn extracts_object_between_prose() {
        let raw = r#"prefix text {"outdated": true, "reason": "x", "suggestion": "y"} trailing"#;
        let parsed: UpdateCheck = extract_object(raw).unwrap();
        assert_eq!(
            parsed,
            UpdateCheck {
                outdated: true,
                reason: "x".into(),
                suggestion: "y".into(),
            }
        );
    }

    #[test]
    fn no_braces_is_a_failure_value() {
        let result: Result<UpdateCheck, _> = extract_object("sorry, I cannot help");
        let err = result.unwrap_err();
        assert_eq!(err, ParseFailure::NoStructuredObject);
        assert_eq!(
            err.to_string(),
            "No valid structured object found in model response"
        );
    }

    #[test]
    fn handles_code_fences_and_nested_objects() {
        let raw = "Here you go:\n```json\n{\n  \"suggestions\": [\n    {\"addition\": \"Cite the 2023 census.\", \"reason\": \"Adds data.\"},\n    {\"addition\": \"Quote an expert.\", \"reason\": \"Authority.\"}\n  ]\n}\n```";
        let parsed: AdditionSuggestions = extract_object(raw).unwrap();
        assert_eq!(parsed.suggestions.len(), 2);
        assert_eq!(parsed.suggestions[1].addition, "Quote an expert.");
    }

    #[test]
    fn skips_malformed_and_mismatched_candidates() {
        let raw = r#"Draft: {outdated: maybe} then {"note": "n/a"} final {"outdated": false, "reason": "still accurate"}"#;
        let parsed: UpdateCheck = extract_object(raw).unwrap();
        assert!(!parsed.outdated);
        assert_eq!(parsed.reason, "still accurate");
        assert_eq!(parsed.suggestion, "");
    }

    #[test]
    fn finds_object_nested_in_wrapper() {
        let raw = r#"{"result": {"outdated": true, "reason": "r", "suggestion": "s"}}"#;
        let parsed: UpdateCheck = extract_object(raw).unwrap();
        assert!(parsed.outdated);
    }

    #[test]
    fn braces_inside_strings_do_not_split_spans() {
        let raw = r#"{"outdated": true, "reason": "uses {placeholder} and \"quoted }\"", "suggestion": ""}"#;
        let parsed: UpdateCheck = extract_object(raw).unwrap();
        assert_eq!(parsed.reason, r#"uses {placeholder} and "quoted }""#);
    }

    #[test]
    fn unclosed_brace_is_skipped() {
        let raw = r#"I think { this is odd. {"outdated": false, "reason": "ok", "suggestion": ""}"#;
        let parsed: UpdateCheck = extract_object(raw).unwrap();
        assert_eq!(parsed.reason, "ok");
    }

    #[test]
    fn null_string_fields_read_as_empty() {
        let raw = r#"{"outdated": false, "reason": "Still accurate.", "suggestion": null}"#;
        let parsed: UpdateCheck = extract_object(raw).unwrap();
        assert!(!parsed.outdated);
        assert_eq!(parsed.reason, "Still accurate.");
        assert_eq!(parsed.suggestion, "");

        let raw = r#"{"suggestions": [{"addition": "Cite the source.", "reason": null}]}"#;
        let parsed: AdditionSuggestions = extract_object(raw).unwrap();
        assert_eq!(parsed.suggestions[0].addition, "Cite the source.");
        assert_eq!(parsed.suggestions[0].reason, "");
    }

    #[test]
    fn missing_outdated_still_rejected() {
        let result: Result<UpdateCheck, _> = extract_object(r#"{"reason": null}"#);
        assert_eq!(result.unwrap_err(), ParseFailure::NoStructuredObject);
    }

    #[test]
    fn candidates_in_order() {
        let spans: Vec<&str> = Candidates::new("a {1} b {x {y}} c }{").collect();
        assert_eq!(spans, vec!["{1}", "{x {y}}", "{y}"]);
    }

    #[test]
    fn repair_list_parses_plain_and_fenced_arrays() {
        let plain = r#"[{"original": "https://a.test/old", "text": "Old", "suggested_replacement": "https://a.test/new"}]"#;
        let entries = parse_repair_list(plain);
        assert_eq!(entries.len(), 1);
        match &entries[0] {
            RepairEntry::Replacement(r) => {
                assert_eq!(r.original, "https://a.test/old");
                assert_eq!(r.suggested_replacement, "https://a.test/new");
            }
            other => panic!("unexpected {other:?}"),
        }

        let fenced = format!("```json\n{plain}\n```");
        assert_eq!(parse_repair_list(&fenced), entries);
    }

    #[test]
    fn repair_list_accepts_null_text() {
        let raw = r#"[{"original": "https://a.test/old", "text": null, "suggested_replacement": "https://a.test/new"}]"#;
        match &parse_repair_list(raw)[..] {
            [RepairEntry::Replacement(r)] => {
                assert_eq!(r.text, "");
                assert_eq!(r.suggested_replacement, "https://a.test/new");
            }
            other => panic!("unexpected {other:?}"),
        }

        // The replacement key itself stays required.
        let entries = parse_repair_list(r#"[{"original": "https://a.test/old", "text": "Old"}]"#);
        assert!(matches!(entries[..], [RepairEntry::Failed { .. }]));
    }

    #[test]
    fn repair_list_failure_is_single_error_entry() {
        let entries = parse_repair_list("I could not find replacements.");
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0], RepairEntry::Failed { error } if error.contains("not a list")));

        // An object is not an array; brace scanning is not used here.
        let entries = parse_repair_list(r#"{"original": "a", "suggested_replacement": "b"}"#);
        assert!(matches!(entries[0], RepairEntry::Failed { .. }));
    }
}
