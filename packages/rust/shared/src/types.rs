//! Core domain types: scraped sections in, analysis records out.

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Section / Link
// ---------------------------------------------------------------------------

/// An outbound hyperlink as found in the page markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Raw `href` attribute. May be relative, absolute, or empty.
    #[serde(default, deserialize_with = "nullable_string")]
    pub href: String,
    /// Anchor text.
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
}

impl Link {
    pub fn new(href: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            content: content.into(),
        }
    }
}

/// One heading-delimited chunk of scraped page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Ordinal identifier (`section_1`, `section_2`, ...), unique per scrape.
    pub id: String,
    /// Accumulated plain text of the section.
    #[serde(default, deserialize_with = "nullable_string")]
    pub content: String,
    /// Outbound links in document order.
    #[serde(default, deserialize_with = "nullable_links")]
    pub links: Vec<Link>,
}

impl Section {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            links: Vec::new(),
        }
    }

    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }
}

fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn nullable_links<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Link>, D::Error> {
    Ok(Option::<Vec<Link>>::deserialize(d)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Task / Step
// ---------------------------------------------------------------------------

/// The analysis performed on every section of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    /// Detect outdated statements.
    UpdateCheck,
    /// Suggest trust-enhancing additions.
    AdditionSuggestion,
    /// Propose replacements for broken links.
    LinkRepair,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateCheck => "update-check",
            Self::AdditionSuggestion => "addition-suggestion",
            Self::LinkRepair => "link-repair",
        }
    }

    /// Degraded payload for a section whose analysis failed at `step`.
    /// Only update and addition failures carry `outdated: false`.
    pub fn failure(&self, step: Step, error: impl Into<String>) -> Analysis {
        let outdated = match self {
            Self::LinkRepair => None,
            Self::UpdateCheck | Self::AdditionSuggestion => Some(false),
        };
        Analysis::Failed(AnalysisFailure {
            outdated,
            error: error.into(),
            step,
        })
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step a per-section failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Embedding,
    Retrieval,
    LinkCheck,
    ModelCall,
    ResponseParse,
    /// The section's worker task itself failed (panic or cancellation).
    Task,
}

// ---------------------------------------------------------------------------
// Task payloads
// ---------------------------------------------------------------------------

/// Model verdict for the update-check task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub outdated: bool,
    #[serde(default, deserialize_with = "nullable_string")]
    pub reason: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub suggestion: String,
}

/// A single suggested addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionSuggestion {
    #[serde(deserialize_with = "nullable_string")]
    pub addition: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub reason: String,
}

/// Model output for the addition-suggestion task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionSuggestions {
    pub suggestions: Vec<AdditionSuggestion>,
}

/// A link whose target failed the reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    /// `href` as it appeared in the markup.
    pub href: String,
    /// Absolute URL that was probed, if the href could be resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    /// Anchor text.
    pub text: String,
    /// HTTP status returned by the probe, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Human-readable classification (`HTTP 404`, `timed out`, ...).
    pub reason: String,
}

impl BrokenLink {
    /// The URL presented to the model: resolved if available, raw otherwise.
    pub fn url(&self) -> &str {
        self.resolved.as_deref().unwrap_or(&self.href)
    }
}

/// A replacement the model proposed for one broken link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReplacement {
    #[serde(deserialize_with = "nullable_string")]
    pub original: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub text: String,
    /// Required key; an explicit `null` reads as empty.
    #[serde(deserialize_with = "nullable_string")]
    pub suggested_replacement: String,
}

/// One entry of the link-repair suggestion list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepairEntry {
    Replacement(LinkReplacement),
    Failed { error: String },
}

/// Result of the link-repair task for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRepair {
    pub broken_links: Vec<BrokenLink>,
    /// Retrieved context handed to the model (empty when no call was made).
    pub context_used: String,
    pub suggestions: Vec<RepairEntry>,
}

/// Degraded payload emitted when a section could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outdated: Option<bool>,
    pub error: String,
    pub step: Step,
}

/// Task-specific analysis payload.
///
/// Serialized untagged so the wire shape is the bare payload object. Variant
/// order matters for deserialization: `Failed` and `LinkRepair` carry
/// required fields the others lack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Analysis {
    Failed(AnalysisFailure),
    LinkRepair(LinkRepair),
    UpdateCheck(UpdateCheck),
    AdditionSuggestions(AdditionSuggestions),
}

impl Analysis {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

// ---------------------------------------------------------------------------
// AnalysisRecord
// ---------------------------------------------------------------------------

/// One output record per input section, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub original_content: String,
    pub links: Vec<Link>,
    pub analysis: Analysis,
}

impl AnalysisRecord {
    pub fn new(section: &Section, analysis: Analysis) -> Self {
        Self {
            id: section.id.clone(),
            original_content: section.content.clone(),
            links: section.links.clone(),
            analysis,
        }
    }
}
