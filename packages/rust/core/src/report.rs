//! Run envelope written by the CLI around the per-section records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pagewise_shared::{AnalysisRecord, Task};

/// One pipeline run: metadata plus a record per input section.
///
/// Every record keeps the `{id, original_content, links, analysis}` shape,
/// failed ones included; a failed section is one whose `analysis` carries
/// `error` and `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub section_count: usize,
    pub failed_count: usize,
    pub records: Vec<AnalysisRecord>,
}

impl AnalysisReport {
    /// Wrap finished records. `finished_at` is taken now.
    pub fn new(
        task: Task,
        base_url: Option<&url::Url>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        started_at: DateTime<Utc>,
        records: Vec<AnalysisRecord>,
    ) -> Self {
        let failed_count = records.iter().filter(|r| r.analysis.is_failed()).count();
        Self {
            run_id: Uuid::now_v7(),
            task,
            base_url: base_url.map(|u| u.to_string()),
            model: model.into(),
            embedding_model: embedding_model.into(),
            started_at,
            finished_at: Utc::now(),
            section_count: records.len(),
            failed_count,
            records,
        }
    }
}
