//! End-to-end full runs with in-process analyzers.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crengine_core::artifacts::{AI_PATCHES_FILE, FINDINGS_FILE, PHASES_FILE, SCORED_FILE};
use crengine_core::{
    ConfigError, EngineConfig, EngineError, FileRecord, Finding, Language, Phase, ReviewSnapshot,
    RunKind, Severity, ToolConfig,
};
use crengine_pipeline::{
    AdapterError, AdapterOutput, AiProviderError, Analyzer, AnalyzerRegistry, FindingContext,
    PatchDrafter, ReviewPipeline,
};

struct Scripted {
    name: &'static str,
    delay: Duration,
    findings: Vec<Finding>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(name: &'static str, delay_ms: u64, findings: Vec<Finding>) -> Arc<Self> {
        Arc::new(Self {
            name,
            delay: Duration::from_millis(delay_ms),
            findings,
            calls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Analyzer for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn accepts(&self, file: &FileRecord) -> bool {
        file.language == Some(Language::Python)
    }

    async fn execute(&self, _files: &[FileRecord], _cwd: &Path, _timeout: Duration) -> AdapterOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        AdapterOutput {
            findings: self.findings.clone(),
            ..AdapterOutput::default()
        }
    }
}

struct Missing;

#[async_trait]
impl Analyzer for Missing {
    fn name(&self) -> &str {
        "missing"
    }

    fn accepts(&self, _file: &FileRecord) -> bool {
        true
    }

    async fn execute(&self, _: &[FileRecord], _: &Path, _: Duration) -> AdapterOutput {
        AdapterOutput::failed(AdapterError::NotInstalled {
            tool: "missing".to_string(),
            binary: "missing-bin".to_string(),
        })
    }
}

struct FixedDrafter;

#[async_trait]
impl PatchDrafter for FixedDrafter {
    fn name(&self) -> &str {
        "fixed"
    }

    fn model(&self) -> &str {
        "fixed-1"
    }

    async fn draft_patch(&self, context: &FindingContext) -> Result<String, AiProviderError> {
        Ok(format!("--- a/{0}\n+++ b/{0}\n", context.finding.file))
    }
}

fn config_without_builtins() -> EngineConfig {
    let mut config = EngineConfig::default();
    for name in ["flake8", "bandit", "semgrep", "eslint"] {
        config.tools.insert(
            name.to_string(),
            ToolConfig {
                enabled: false,
                ..ToolConfig::default()
            },
        );
    }
    config
}

fn make_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.py"), "import os\npassword = 'hunter2'\n").unwrap();
    std::fs::write(dir.path().join("util.py"), "def f():\n    return 1\n").unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    dir
}

fn lint_findings() -> Vec<Finding> {
    vec![
        Finding::new("lint", "util.py", 2, "W1", Severity::Info, "trailing").with_tags(["style"]),
        Finding::new("lint", "./app.py", 1, "F401", Severity::Low, "'os' imported but unused")
            .with_column(1)
            .with_tags(["lint"]),
    ]
}

fn secret_findings() -> Vec<Finding> {
    vec![
        Finding::new("sec", "app.py", 2, "B105", Severity::Critical, "hardcoded password")
            .with_tags(["security", "secrets"]),
        Finding::new("sec", "app.py", 2, "B105", Severity::Critical, "hardcoded password")
            .with_tags(["security", "secrets"]),
    ]
}

fn pipeline(repo: &Path, out: &Path, registry: AnalyzerRegistry) -> ReviewPipeline {
    ReviewPipeline::new(repo, out, Arc::new(config_without_builtins())).with_registry(registry)
}

#[tokio::test]
async fn full_run_writes_all_artifacts() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();
    let lint = Scripted::new("lint", 1, lint_findings());
    let sec = Scripted::new("sec", 1, secret_findings());
    let pipeline = pipeline(
        repo.path(),
        out.path(),
        AnalyzerRegistry::new()
            .with(lint.clone())
            .with(sec.clone()),
    );

    let report = pipeline.run_full().await.expect("full run failed");

    assert_eq!(report.record.kind, RunKind::Full);
    assert_eq!(report.record.commit, None);
    assert_eq!(
        pipeline.store().latest_dir().unwrap().as_deref(),
        Some(report.run_dir.as_path())
    );
    for name in [FINDINGS_FILE, SCORED_FILE, PHASES_FILE, "000_manifest.json", "run.json"] {
        assert!(report.run_dir.join(name).is_file(), "missing {name}");
    }
    assert!(!report.run_dir.join(AI_PATCHES_FILE).exists());
    assert_eq!(lint.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sec.calls.load(Ordering::SeqCst), 1);

    let summary = &report.record.summary;
    assert_eq!(summary.files, 3);
    // duplicate secret collapses to one record
    assert_eq!(summary.findings, 3);
    assert_eq!(summary.items, 3);
    let tools: Vec<(&str, &str)> = summary
        .tools
        .iter()
        .map(|t| (t.tool.as_str(), t.status.as_str()))
        .collect();
    assert_eq!(tools, vec![("lint", "ok"), ("sec", "ok")]);

    let snapshot: ReviewSnapshot = pipeline
        .store()
        .read_verified(&report.run_dir, SCORED_FILE)
        .expect("digest matches run record");
    let files: Vec<&str> = snapshot.items.iter().map(|i| i.finding.file.as_str()).collect();
    assert_eq!(files, vec!["app.py", "app.py", "util.py"]);
}

#[tokio::test]
async fn hardcoded_secret_is_top_value_in_security_phase() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        repo.path(),
        out.path(),
        AnalyzerRegistry::new().with(Scripted::new("sec", 1, secret_findings())),
    );

    let report = pipeline.run_full().await.unwrap();
    let security = report.plan.phase(Phase::Security).unwrap();
    assert_eq!(security.items.len(), 1);
    let planned = &security.items[0];
    assert_eq!(planned.item.value, 5);
    assert_eq!(planned.primary_tag.as_deref(), Some("security"));
    assert_eq!(report.record.summary.phase_counts["security"], 1);
}

#[tokio::test]
async fn scored_output_is_identical_regardless_of_completion_order() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();

    let first = pipeline(
        repo.path(),
        out.path(),
        AnalyzerRegistry::new()
            .with(Scripted::new("lint", 80, lint_findings()))
            .with(Scripted::new("sec", 1, secret_findings())),
    )
    .run_full()
    .await
    .unwrap();

    let mut reversed = lint_findings();
    reversed.reverse();
    let second = pipeline(
        repo.path(),
        out.path(),
        AnalyzerRegistry::new()
            .with(Scripted::new("lint", 1, reversed))
            .with(Scripted::new("sec", 80, secret_findings())),
    )
    .run_full()
    .await
    .unwrap();

    assert_ne!(first.run_dir, second.run_dir);
    for name in [SCORED_FILE, PHASES_FILE, FINDINGS_FILE] {
        let a = std::fs::read(first.run_dir.join(name)).unwrap();
        let b = std::fs::read(second.run_dir.join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}

#[tokio::test]
async fn failing_analyzer_degrades_to_a_warning() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        repo.path(),
        out.path(),
        AnalyzerRegistry::new()
            .with(Arc::new(Missing))
            .with(Scripted::new("lint", 1, lint_findings())),
    );

    let report = pipeline.run_full().await.unwrap();
    let summary = &report.record.summary;
    assert_eq!(summary.items, 2);
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].contains("missing-bin"));
    let missing = summary.tools.iter().find(|t| t.tool == "missing").unwrap();
    assert_eq!(missing.status, "not_installed");
    assert_eq!(missing.findings, 0);
}

#[tokio::test]
async fn run_timeout_aborts_stuck_analyzers() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();
    let mut config = config_without_builtins();
    config.pipeline.run_timeout_secs = 1;
    let registry = AnalyzerRegistry::new()
        .with(Scripted::new("stuck", 60_000, lint_findings()))
        .with(Scripted::new("sec", 1, secret_findings()));
    let pipeline = ReviewPipeline::new(repo.path(), out.path(), Arc::new(config))
        .with_registry(registry);

    let started = std::time::Instant::now();
    let report = pipeline.run_full().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    let stuck = report
        .record
        .summary
        .tools
        .iter()
        .find(|t| t.tool == "stuck")
        .unwrap();
    assert_eq!(stuck.status, "timeout");
    assert_eq!(report.record.summary.items, 1);
}

#[tokio::test]
async fn ai_drafts_are_written_when_a_drafter_is_present() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        repo.path(),
        out.path(),
        AnalyzerRegistry::new()
            .with(Scripted::new("lint", 1, lint_findings()))
            .with(Scripted::new("sec", 1, secret_findings())),
    )
    .with_drafter(Arc::new(FixedDrafter));

    let report = pipeline.run_full().await.unwrap();
    let raw = std::fs::read_to_string(report.run_dir.join(AI_PATCHES_FILE)).unwrap();
    let drafts: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(drafts["provider"], "fixed");
    assert_eq!(drafts["drafts"].as_array().unwrap().len(), 3);
    // highest value first: the secret
    assert_eq!(drafts["drafts"][0]["key"]["rule_id"], "B105");
    assert!(report.record.artifacts.contains_key(AI_PATCHES_FILE));
}

#[tokio::test]
async fn unknown_tool_section_fails_before_any_analyzer_runs() {
    let repo = make_repo();
    let out = tempfile::tempdir().unwrap();
    let mut config = config_without_builtins();
    config
        .tools
        .insert("pylint".to_string(), ToolConfig::default());
    let lint = Scripted::new("lint", 1, lint_findings());
    let pipeline = ReviewPipeline::new(repo.path(), out.path(), Arc::new(config))
        .with_registry(AnalyzerRegistry::new().with(lint.clone()));

    let err = pipeline.run_full().await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::UnknownTool(ref name)) if name == "pylint"
    ));
    assert_eq!(lint.calls.load(Ordering::SeqCst), 0);
    assert!(pipeline.store().latest_dir().unwrap().is_none());
}
