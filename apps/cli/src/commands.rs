//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;
use url::Url;

use pagewise_core::{
    AnalysisReport, ChatCompletionClient, Pipeline, PipelineConfig, ProgressReporter,
    check_section_links,
};
use pagewise_linkcheck::LinkChecker;
use pagewise_rag::HttpEmbedder;
use pagewise_shared::{
    AppConfig, Section, Task, init_config, load_config, load_sections, load_sections_from,
    validate_api_keys,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pagewise: retrieval-augmented review of scraped web pages.
#[derive(Parser)]
#[command(
    name = "pagewise",
    version,
    about = "Review scraped page sections for outdated content, missing context, and broken links.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Flag outdated statements in each section.
    Update(RunArgs),

    /// Suggest trust-enhancing additions for each section.
    Add(RunArgs),

    /// Find broken links and ask the model for replacements.
    ///
    /// Each record's `analysis` holds `broken_links`, `context_used` and
    /// `suggestions`, or `error` and `step` when the section failed.
    Links {
        #[command(flatten)]
        run: RunArgs,

        /// Page URL that relative hrefs resolve against.
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Report broken links per section without calling a model.
    CheckLinks {
        /// Scrape payload (JSON array of sections), or `-` for stdin.
        #[arg(short, long)]
        input: String,

        /// Page URL that relative hrefs resolve against.
        #[arg(long)]
        base_url: Option<String>,

        /// Write JSON here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments shared by the analysis commands.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Scrape payload (JSON array of sections), or `-` for stdin.
    #[arg(short, long)]
    pub input: String,

    /// Write the report here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Related sections retrieved as context (overrides config).
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Sections analyzed at once (overrides config).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Chat model id (overrides config).
    #[arg(long)]
    pub model: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries reports.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagewise=info",
        1 => "pagewise=debug",
        _ => "pagewise=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Update(args) => cmd_analyze(Task::UpdateCheck, &args, None).await,
        Command::Add(args) => cmd_analyze(Task::AdditionSuggestion, &args, None).await,
        Command::Links { run, base_url } => {
            cmd_analyze(Task::LinkRepair, &run, base_url.as_deref()).await
        }
        Command::CheckLinks {
            input,
            base_url,
            out,
        } => cmd_check_links(&input, base_url.as_deref(), out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_analyze(task: Task, args: &RunArgs, base_url: Option<&str>) -> Result<()> {
    let mut config = load_config()?;
    apply_overrides(&mut config, args);
    validate_api_keys(&config)?;

    let base_url = parse_base_url(base_url)?;
    let sections = read_sections(&args.input)?;

    let embedder = HttpEmbedder::from_config(&config.embedding)?;
    let model = ChatCompletionClient::from_config(&config.model)?;
    let checker = LinkChecker::new(&config.link_check)?;
    let pipeline = Pipeline::new(
        embedder,
        model,
        checker,
        PipelineConfig::from(&config.defaults),
    );

    info!(
        %task,
        sections = sections.len(),
        model = pipeline.model_id(),
        top_k = config.defaults.top_k,
        concurrency = config.defaults.concurrency,
        "starting analysis"
    );

    let started_at = Utc::now();
    let reporter = CliProgress::new();
    let records = pipeline
        .run(task, &sections, base_url.as_ref(), &reporter)
        .await;
    reporter.finish();
    let records = records?;

    let report = AnalysisReport::new(
        task,
        base_url.as_ref(),
        pipeline.model_id(),
        pipeline.embedding_model_id(),
        started_at,
        records,
    );
    write_json(&report, args.out.as_deref())?;

    info!(
        run_id = %report.run_id,
        sections = report.section_count,
        failed = report.failed_count,
        "analysis complete"
    );
    Ok(())
}

async fn cmd_check_links(input: &str, base_url: Option<&str>, out: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let base_url = parse_base_url(base_url)?;
    let sections = read_sections(input)?;
    let checker = LinkChecker::new(&config.link_check)?;

    let reporter = CliProgress::new();
    let results = check_section_links(&checker, &sections, base_url.as_ref(), &reporter).await;
    reporter.finish();

    write_json(&results?, out)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if let Some(top_k) = args.top_k {
        config.defaults.top_k = top_k;
    }
    if let Some(concurrency) = args.concurrency {
        config.defaults.concurrency = concurrency.max(1);
    }
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }
}

fn parse_base_url(raw: Option<&str>) -> Result<Option<Url>> {
    raw.map(|s| Url::parse(s).map_err(|e| eyre!("invalid base URL '{s}': {e}")))
        .transpose()
}

/// Load sections from a file, or from stdin when `input` is `-`.
fn read_sections(input: &str) -> Result<Vec<Section>> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .wrap_err("failed to read sections from stdin")?;
        return Ok(load_sections(&buf)?);
    }
    Ok(load_sections_from(Path::new(input))?)
}

fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn section_done(&self, id: &str, current: usize, total: usize, failed: bool) {
        let mark = if failed { " (failed)" } else { "" };
        self.spinner
            .set_message(format!("Analyzed [{current}/{total}] {id}{mark}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_analysis_flags() {
        let cli = Cli::try_parse_from([
            "pagewise",
            "links",
            "--input",
            "page.json",
            "--base-url",
            "https://example.com",
            "--top-k",
            "5",
            "--model",
            "openai/gpt-4o-mini",
        ])
        .unwrap();

        match cli.command {
            Command::Links { run, base_url } => {
                assert_eq!(run.input, "page.json");
                assert_eq!(run.top_k, Some(5));
                assert_eq!(base_url.as_deref(), Some("https://example.com"));

                let mut config = AppConfig::default();
                apply_overrides(&mut config, &run);
                assert_eq!(config.defaults.top_k, 5);
                assert_eq!(config.defaults.concurrency, 4);
                assert_eq!(config.model.model, "openai/gpt-4o-mini");
            }
            _ => panic!("expected links command"),
        }
    }

    #[test]
    fn check_links_requires_input() {
        assert!(Cli::try_parse_from(["pagewise", "check-links"]).is_err());
    }

    #[test]
    fn base_url_must_parse() {
        assert!(parse_base_url(None).unwrap().is_none());
        assert!(parse_base_url(Some("not a url")).is_err());
        assert_eq!(
            parse_base_url(Some("https://example.com/a")).unwrap().unwrap().as_str(),
            "https://example.com/a"
        );
    }
}
