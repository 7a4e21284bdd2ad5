//! crengine - multi-tool code review engine
//!
//! ## Commands
//!
//! - `full`: review the whole repository
//! - `delta`: re-review only what changed since the last run (or `--base`)
//! - `check-config`: validate the configuration and list analyzers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crengine_core::config::DEFAULT_CONFIG_FILE;
use crengine_core::{EngineConfig, LogFormat};
use crengine_pipeline::{AnalyzerRegistry, ReviewPipeline, RunReport};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "crengine")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scored, phased code review from multiple static analyzers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository to review
    #[arg(long, global = true, env = "CRENGINE_REPO", default_value = ".")]
    repo: PathBuf,

    /// Config file (default: crengine.toml in the repository, if present)
    #[arg(long, global = true, env = "CRENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Artifact directory (default: <repo>/.crengine/runs)
    #[arg(long, global = true, env = "CRENGINE_OUT")]
    out: Option<PathBuf>,

    /// Override the configured AI provider ("none" disables drafting)
    #[arg(long, global = true)]
    ai_provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review every file in the repository
    Full {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Re-review changed hunks and merge them into the previous result
    Delta {
        /// Base reference (default: commit of the latest run)
        #[arg(long)]
        base: Option<String>,

        /// Head reference (default: the working tree)
        #[arg(long)]
        head: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate configuration without running anything
    CheckConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    crengine_core::init_tracing(log_format, level);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Full { format } => {
            let report = pipeline(&cli.repo, cli.out.as_deref(), config)
                .run_full()
                .await
                .context("full review failed")?;
            print_report(&report, format)
        }
        Commands::Delta { base, head, format } => {
            let report = pipeline(&cli.repo, cli.out.as_deref(), config)
                .run_delta(base.as_deref(), head.as_deref())
                .await
                .context("delta review failed")?;
            print_report(&report, format)
        }
        Commands::CheckConfig => cmd_check_config(&config),
    }
}

/// Load, override and validate the engine config.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::discover(&cli.repo).with_context(|| {
            format!(
                "failed to load {} from {}",
                DEFAULT_CONFIG_FILE,
                cli.repo.display()
            )
        })?,
    };
    if let Some(provider) = &cli.ai_provider {
        config.ai.provider = provider.clone();
        config.validate().context("invalid --ai-provider")?;
    }
    Ok(config)
}

fn pipeline(repo: &Path, out: Option<&Path>, config: EngineConfig) -> ReviewPipeline {
    let out = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repo.join(".crengine").join("runs"));
    info!(repo = %repo.display(), out = %out.display(), "starting review");
    ReviewPipeline::new(repo, out, Arc::new(config))
}

fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.record)?),
        OutputFormat::Text => print!("{}", render_report(report)),
    }
    Ok(())
}

fn render_report(report: &RunReport) -> String {
    let record = &report.record;
    let summary = &record.summary;
    let mut out = String::new();

    out.push_str(&format!("Run:      {}\n", report.run_dir.display()));
    out.push_str(&format!(
        "Commit:   {}\n",
        record.commit.as_deref().unwrap_or("(none)")
    ));
    if let Some(base) = &record.base_commit {
        out.push_str(&format!("Base:     {base}\n"));
    }
    out.push_str(&format!(
        "Files:    {} ({} skipped)\n",
        summary.files, summary.skipped_files
    ));
    out.push_str(&format!(
        "Findings: {} raw, {} scored, {:.1}h estimated\n",
        summary.findings, summary.items, summary.estimated_hours
    ));

    out.push_str("\nPhases:\n");
    for group in &report.plan.phases {
        out.push_str(&format!(
            "  {:<24} {:>4} items  {:>6.1}h\n",
            group.title,
            group.items.len(),
            group.estimated_hours
        ));
    }

    if !summary.tools.is_empty() {
        out.push_str("\nTools:\n");
        for tool in &summary.tools {
            out.push_str(&format!(
                "  {:<12} {:<16} {} findings\n",
                tool.tool, tool.status, tool.findings
            ));
        }
    }

    if let Some(delta) = &report.delta {
        out.push_str(&format!(
            "\nDelta:    {} files, {} added, {} superseded, {} dropped, {} carried ({} moved), {} ignored\n",
            delta.files.len(),
            delta.added.len(),
            delta.superseded.len(),
            delta.dropped.len(),
            delta.carried,
            delta.shifted,
            delta.ignored
        ));
    }

    if !summary.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for warning in &summary.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }
    out
}

/// Validate config and list what a run would execute.
fn cmd_check_config(config: &EngineConfig) -> Result<()> {
    let registry = AnalyzerRegistry::new();
    registry.validate(config)?;
    let digest = config.digest()?;

    println!("Config OK");
    println!("Digest: {digest}");
    println!("\nAnalyzers:");
    for name in registry.names() {
        let tool = config.tool(&name);
        let state = if tool.enabled { "enabled" } else { "disabled" };
        println!(
            "  {name:<12} {state:<9} timeout {}s, {} files/invocation",
            tool.timeout_secs, tool.max_files_per_invocation
        );
    }
    println!("\nAI provider: {}", config.ai.provider);
    Ok(())
}
