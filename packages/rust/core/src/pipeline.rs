//! Per-section analysis pipeline: index → retrieve → prompt → model → parse.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use pagewise_linkcheck::LinkChecker;
use pagewise_rag::{Embedder, EmbeddingIndex, Retriever};
use pagewise_shared::{
    AdditionSuggestions, Analysis, AnalysisRecord, BrokenLink, DefaultsConfig, Link, LinkRepair,
    Result, Section, Step, Task, UpdateCheck, validate_sections,
};

use crate::model::CompletionModel;
use crate::prompt::build_prompt;
use crate::response::{extract_object, parse_repair_list};

/// Tuning knobs for [`Pipeline::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of neighbouring sections retrieved as context.
    pub top_k: usize,
    /// Maximum sections analyzed at once.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            concurrency: 4,
        }
    }
}

impl From<&DefaultsConfig> for PipelineConfig {
    fn from(defaults: &DefaultsConfig) -> Self {
        Self {
            top_k: defaults.top_k,
            concurrency: defaults.concurrency,
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each section's result is collected, in input order.
    fn section_done(&self, id: &str, current: usize, total: usize, failed: bool);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn section_done(&self, _id: &str, _current: usize, _total: usize, _failed: bool) {}
}

/// Runs one task over a batch of sections.
///
/// Collaborators are shared behind `Arc` and hold no per-run state, so one
/// pipeline can serve several runs.
pub struct Pipeline<E, M> {
    embedder: Arc<E>,
    model: Arc<M>,
    link_checker: Arc<LinkChecker>,
    config: PipelineConfig,
}

impl<E, M> Pipeline<E, M>
where
    E: Embedder + 'static,
    M: CompletionModel + 'static,
{
    pub fn new(embedder: E, model: M, link_checker: LinkChecker, config: PipelineConfig) -> Self {
        Self {
            embedder: Arc::new(embedder),
            model: Arc::new(model),
            link_checker: Arc::new(link_checker),
            config,
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn embedding_model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Analyze every section and return one record per section, in input order.
    ///
    /// Only invalid input (empty or duplicate ids) is an `Err`. Failures inside
    /// a section become [`Analysis::Failed`] records naming the failing step.
    #[instrument(skip_all, fields(task = %task, sections = sections.len()))]
    pub async fn run(
        &self,
        task: Task,
        sections: &[Section],
        base_url: Option<&Url>,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<AnalysisRecord>> {
        let start = Instant::now();
        validate_sections(sections)?;
        let total = sections.len();

        // --- Phase 1: Embedding index ---
        progress.phase("Building embedding index");
        let index = match EmbeddingIndex::build(self.embedder.as_ref(), sections).await {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "embedding index build failed, degrading every section");
                let error = e.to_string();
                let records: Vec<AnalysisRecord> = sections
                    .iter()
                    .enumerate()
                    .map(|(i, section)| {
                        progress.section_done(&section.id, i + 1, total, true);
                        AnalysisRecord::new(section, task.failure(Step::Embedding, error.clone()))
                    })
                    .collect();
                return Ok(records);
            }
        };
        let retriever = Retriever::new(Arc::new(index), Arc::clone(&self.embedder))?;

        // --- Phase 2: Per-section analysis ---
        progress.phase("Analyzing sections");
        let worker = SectionWorker {
            retriever,
            model: Arc::clone(&self.model),
            link_checker: Arc::clone(&self.link_checker),
            base_url: base_url.cloned(),
            top_k: self.config.top_k,
        };
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);

        for section in sections {
            let worker = worker.clone();
            let sem = Arc::clone(&semaphore);
            let section = section.clone();
            handles.push(tokio::spawn(async move {
                match sem.acquire_owned().await {
                    Ok(_permit) => worker.analyze(task, &section).await,
                    Err(_) => task.failure(Step::Task, "analysis cancelled"),
                }
            }));
        }

        // Await in input order so records line up with sections.
        let mut records = Vec::with_capacity(total);
        for (i, (section, handle)) in sections.iter().zip(handles).enumerate() {
            let analysis = match handle.await {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(id = %section.id, error = %e, "section task aborted");
                    task.failure(Step::Task, format!("section task failed: {e}"))
                }
            };
            progress.section_done(&section.id, i + 1, total, analysis.is_failed());
            records.push(AnalysisRecord::new(section, analysis));
        }

        let failed = records.iter().filter(|r| r.analysis.is_failed()).count();
        info!(
            sections = total,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline complete"
        );

        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Section worker
// ---------------------------------------------------------------------------

/// Everything one section task needs, cheap to clone into `tokio::spawn`.
struct SectionWorker<E, M> {
    retriever: Retriever<E>,
    model: Arc<M>,
    link_checker: Arc<LinkChecker>,
    base_url: Option<Url>,
    top_k: usize,
}

impl<E, M> Clone for SectionWorker<E, M> {
    fn clone(&self) -> Self {
        Self {
            retriever: self.retriever.clone(),
            model: Arc::clone(&self.model),
            link_checker: Arc::clone(&self.link_checker),
            base_url: self.base_url.clone(),
            top_k: self.top_k,
        }
    }
}

impl<E: Embedder, M: CompletionModel> SectionWorker<E, M> {
    async fn analyze(&self, task: Task, section: &Section) -> Analysis {
        let result = match task {
            Task::UpdateCheck => self.update_check(section).await,
            Task::AdditionSuggestion => self.addition_suggestion(section).await,
            Task::LinkRepair => self.link_repair(section).await,
        };
        match result {
            Ok(analysis) => analysis,
            Err((step, error)) => {
                warn!(id = %section.id, ?step, %error, "section analysis failed");
                task.failure(step, error)
            }
        }
    }

    async fn update_check(&self, section: &Section) -> StepResult<Analysis> {
        let reply = self.ask(Task::UpdateCheck, section).await?;
        extract_object::<UpdateCheck>(&reply)
            .map(Analysis::UpdateCheck)
            .map_err(|e| (Step::ResponseParse, e.to_string()))
    }

    async fn addition_suggestion(&self, section: &Section) -> StepResult<Analysis> {
        let reply = self.ask(Task::AdditionSuggestion, section).await?;
        extract_object::<AdditionSuggestions>(&reply)
            .map(Analysis::AdditionSuggestions)
            .map_err(|e| (Step::ResponseParse, e.to_string()))
    }

    async fn link_repair(&self, section: &Section) -> StepResult<Analysis> {
        let broken_links = self
            .link_checker
            .find_broken(&section.links, self.base_url.as_ref())
            .await
            .map_err(|e| (Step::LinkCheck, e.to_string()))?;

        if broken_links.is_empty() {
            debug!(id = %section.id, "no broken links");
            return Ok(Analysis::LinkRepair(LinkRepair {
                broken_links,
                context_used: String::new(),
                suggestions: Vec::new(),
            }));
        }

        let context = self.context_for(section).await?;
        let targets = repair_targets(&broken_links);
        let prompt = build_prompt(Task::LinkRepair, &section.content, &targets, &context);
        let reply = self.complete(&prompt).await?;

        Ok(Analysis::LinkRepair(LinkRepair {
            broken_links,
            context_used: context,
            suggestions: parse_repair_list(&reply),
        }))
    }

    /// Retrieve context, render the task prompt, and call the model.
    async fn ask(&self, task: Task, section: &Section) -> StepResult<String> {
        let context = self.context_for(section).await?;
        let prompt = build_prompt(task, &section.content, &section.links, &context);
        self.complete(&prompt).await
    }

    async fn context_for(&self, section: &Section) -> StepResult<String> {
        self.retriever
            .query(&section.content, self.top_k)
            .await
            .map_err(|e| (Step::Retrieval, e.to_string()))
    }

    async fn complete(&self, prompt: &str) -> StepResult<String> {
        self.model
            .complete(prompt)
            .await
            .map_err(|e| (Step::ModelCall, e.to_string()))
    }
}

type StepResult<T> = std::result::Result<T, (Step, String)>;

/// Broken links as prompt entries, using the probed URL where known.
fn repair_targets(broken: &[BrokenLink]) -> Vec<Link> {
    broken
        .iter()
        .map(|b| Link::new(b.url(), b.text.as_str()))
        .collect()
}

// ---------------------------------------------------------------------------
// Link check only
// ---------------------------------------------------------------------------

/// Broken links found in one section, without any model involvement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLinkCheck {
    pub id: String,
    pub broken_links: Vec<BrokenLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe every section's links and report the broken ones, in input order.
#[instrument(skip_all, fields(sections = sections.len()))]
pub async fn check_section_links(
    checker: &LinkChecker,
    sections: &[Section],
    base_url: Option<&Url>,
    progress: &dyn ProgressReporter,
) -> Result<Vec<SectionLinkCheck>> {
    validate_sections(sections)?;
    progress.phase("Checking links");

    let total = sections.len();
    let mut results = Vec::with_capacity(total);
    for (i, section) in sections.iter().enumerate() {
        let result = match checker.find_broken(&section.links, base_url).await {
            Ok(broken_links) => SectionLinkCheck {
                id: section.id.clone(),
                broken_links,
                error: None,
            },
            Err(e) => {
                warn!(id = %section.id, error = %e, "link check failed");
                SectionLinkCheck {
                    id: section.id.clone(),
                    broken_links: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        progress.section_done(&section.id, i + 1, total, result.error.is_some());
        results.push(result);
    }

    let broken: usize = results.iter().map(|r| r.broken_links.len()).sum();
    info!(sections = total, broken, "link check complete");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pagewise_shared::{LinkCheckConfig, PagewiseError, RepairEntry};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Two-dimensional embedding: text length and count of the letter `e`.
    struct StubEmbedder {
        fail: bool,
    }

    impl Embedder for StubEmbedder {
        fn model_id(&self) -> &str {
            "stub-embed"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(PagewiseError::Embedding("backend unavailable".into()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, t.matches('e').count() as f32])
                .collect())
        }
    }

    enum Behavior {
        Reply(&'static str),
        Fail,
        PanicOn(&'static str),
    }

    struct StubModel {
        behavior: Behavior,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl StubModel {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CompletionModel for StubModel {
        fn model_id(&self) -> &str {
            "stub-model"
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.behavior {
                Behavior::Reply(reply) => Ok(reply.to_string()),
                Behavior::Fail => Err(PagewiseError::Model("quota exceeded".into())),
                Behavior::PanicOn(marker) => {
                    if prompt.contains(marker) {
                        panic!("stub model blew up");
                    }
                    Ok(r#"{"outdated": false, "reason": "fine", "suggestion": ""}"#.into())
                }
            }
        }
    }

    fn checker() -> LinkChecker {
        let config = LinkCheckConfig {
            timeout_secs: 2,
            ..Default::default()
        };
        LinkChecker::new(&config).unwrap().allow_private_hosts()
    }

    fn pipeline(embedder: StubEmbedder, model: StubModel) -> Pipeline<StubEmbedder, StubModel> {
        Pipeline::new(embedder, model, checker(), PipelineConfig::default())
    }

    fn sections() -> Vec<Section> {
        vec![
            Section::new("section_1", "Getting started with the product."),
            Section::new("section_2", "Pricing has three tiers."),
            Section::new("section_3", "Meet the team behind everything."),
            Section::new("section_4", ""),
        ]
    }

    fn ids(records: &[AnalysisRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn paris_update_check_end_to_end() {
        let reply = r#"Sure! {"outdated": true, "reason": "Paris is the capital of France, not Germany.", "suggestion": "Paris is the capital of France."}"#;
        let pipeline = pipeline(StubEmbedder { fail: false }, StubModel::new(Behavior::Reply(reply)));
        let input = vec![Section::new("section_1", "Paris is the capital of Germany.")];

        let records = pipeline
            .run(Task::UpdateCheck, &input, None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_content, "Paris is the capital of Germany.");
        assert_eq!(
            records[0].analysis,
            Analysis::UpdateCheck(UpdateCheck {
                outdated: true,
                reason: "Paris is the capital of France, not Germany.".into(),
                suggestion: "Paris is the capital of France.".into(),
            })
        );

        // The section is its own nearest neighbour, so it appears as context.
        let prompts = pipeline.model.prompts.lock().unwrap();
        assert_eq!(prompts[0].matches("Paris is the capital of Germany.").count(), 2);
    }

    #[tokio::test]
    async fn records_match_input_order() {
        let reply = r#"{"suggestions": [{"addition": "Add a source.", "reason": "Trust."}]}"#;
        let pipeline = Pipeline::new(
            StubEmbedder { fail: false },
            StubModel::new(Behavior::Reply(reply)),
            checker(),
            PipelineConfig {
                top_k: 2,
                concurrency: 2,
            },
        );
        let input = sections();

        let records = pipeline
            .run(Task::AdditionSuggestion, &input, None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["section_1", "section_2", "section_3", "section_4"]);
        for record in &records {
            match &record.analysis {
                Analysis::AdditionSuggestions(s) => assert_eq!(s.suggestions.len(), 1),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(pipeline.model.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failing_model_degrades_every_record() {
        let pipeline = pipeline(StubEmbedder { fail: false }, StubModel::new(Behavior::Fail));
        let records = pipeline
            .run(Task::UpdateCheck, &sections(), None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(records.len(), 4);
        for record in &records {
            match &record.analysis {
                Analysis::Failed(f) => {
                    assert_eq!(f.step, Step::ModelCall);
                    assert_eq!(f.outdated, Some(false));
                    assert!(f.error.contains("quota exceeded"));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn failing_embedder_degrades_with_embedding_step() {
        let pipeline = pipeline(
            StubEmbedder { fail: true },
            StubModel::new(Behavior::Reply("{}")),
        );
        let records = pipeline
            .run(Task::AdditionSuggestion, &sections(), None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["section_1", "section_2", "section_3", "section_4"]);
        assert!(records.iter().all(|r| matches!(
            &r.analysis,
            Analysis::Failed(f) if f.step == Step::Embedding && f.error.contains("backend unavailable")
        )));
        assert_eq!(pipeline.model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_reply_is_a_parse_failure() {
        let pipeline = pipeline(
            StubEmbedder { fail: false },
            StubModel::new(Behavior::Reply("I think it is fine.")),
        );
        let records = pipeline
            .run(Task::UpdateCheck, &sections()[..1], None, &SilentProgress)
            .await
            .unwrap();

        let json = serde_json::to_value(&records[0].analysis).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "outdated": false,
                "error": "No valid structured object found in model response",
                "step": "response_parse"
            })
        );
    }

    #[tokio::test]
    async fn panicking_section_is_isolated() {
        let pipeline = pipeline(
            StubEmbedder { fail: false },
            StubModel::new(Behavior::PanicOn("Pricing has three tiers.\n\"\"\"\n\nDecide")),
        );
        let records = pipeline
            .run(Task::UpdateCheck, &sections(), None, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(records.len(), 4);
        assert!(matches!(&records[1].analysis, Analysis::Failed(f) if f.step == Step::Task));
        assert!(matches!(records[0].analysis, Analysis::UpdateCheck(_)));
        assert!(matches!(records[2].analysis, Analysis::UpdateCheck(_)));
    }

    #[tokio::test]
    async fn empty_input_yields_no_records() {
        let pipeline = pipeline(StubEmbedder { fail: true }, StubModel::new(Behavior::Fail));
        let records = pipeline
            .run(Task::UpdateCheck, &[], None, &SilentProgress)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let pipeline = pipeline(StubEmbedder { fail: false }, StubModel::new(Behavior::Fail));
        let input = vec![Section::new("a", "one"), Section::new("a", "two")];
        let err = pipeline
            .run(Task::UpdateCheck, &input, None, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, PagewiseError::Validation { .. }));
    }

    #[tokio::test]
    async fn link_repair_only_calls_model_for_broken_links() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/old-team"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let reply = r#"```json
[{"original": "old", "text": "Team", "suggested_replacement": "https://example.com/team"}]
```"#;
        let pipeline = pipeline(StubEmbedder { fail: false }, StubModel::new(Behavior::Reply(reply)));
        let base = Url::parse(&server.uri()).unwrap();
        let input = vec![
            Section::new("section_1", "About us.").with_links(vec![Link::new("/about", "About")]),
            Section::new("section_2", "Our team.").with_links(vec![
                Link::new("/about", "About"),
                Link::new("/old-team", "Team"),
                Link::new("#top", "Top"),
            ]),
            Section::new("section_3", "No links here."),
        ];

        let records = pipeline
            .run(Task::LinkRepair, &input, Some(&base), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(ids(&records), vec!["section_1", "section_2", "section_3"]);

        for i in [0, 2] {
            assert_eq!(
                records[i].analysis,
                Analysis::LinkRepair(LinkRepair {
                    broken_links: vec![],
                    context_used: String::new(),
                    suggestions: vec![],
                })
            );
        }

        match &records[1].analysis {
            Analysis::LinkRepair(repair) => {
                assert_eq!(repair.broken_links.len(), 1);
                assert_eq!(repair.broken_links[0].href, "/old-team");
                assert_eq!(repair.broken_links[0].status, Some(404));
                assert!(repair.context_used.contains("Our team."));
                assert!(matches!(
                    &repair.suggestions[..],
                    [RepairEntry::Replacement(r)] if r.suggested_replacement == "https://example.com/team"
                ));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(pipeline.model.calls.load(Ordering::SeqCst), 1);
        let prompts = pipeline.model.prompts.lock().unwrap();
        assert!(prompts[0].contains(&format!("- Team ({}/old-team)", server.uri())));
    }

    #[tokio::test]
    async fn link_repair_failure_omits_outdated() {
        let pipeline = pipeline(StubEmbedder { fail: false }, StubModel::new(Behavior::Fail));
        // Relative link without a base URL is broken, so the model is called.
        let input = vec![Section::new("section_1", "x").with_links(vec![Link::new("/a", "A")])];

        let records = pipeline
            .run(Task::LinkRepair, &input, None, &SilentProgress)
            .await
            .unwrap();

        match &records[0].analysis {
            Analysis::Failed(f) => {
                assert_eq!(f.step, Step::ModelCall);
                assert_eq!(f.outdated, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_section_links_reports_per_section() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/here"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let input = vec![
            Section::new("s1", "").with_links(vec![Link::new("/here", "Here")]),
            Section::new("s2", "").with_links(vec![Link::new("/gone", "Gone")]),
        ];

        let results = check_section_links(&checker(), &input, Some(&base), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].broken_links.is_empty());
        assert_eq!(results[1].broken_links[0].reason, "HTTP 410");
        assert!(results.iter().all(|r| r.error.is_none()));
    }
}
