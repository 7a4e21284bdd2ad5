//! Full and delta review runs.
//!
//! Full: manifest → analyzers (bounded, parallel) → normalize → score →
//! consolidate → optional AI drafting → artifacts.
//!
//! Delta: diff → scoped manifest → the same analyzer chain on changed files
//! only → merge with the previous run's scored set → consolidate →
//! artifacts and delta history.
//!
//! Configuration and scope errors are raised before any analyzer starts, and
//! artifacts are staged so a failed run never leaves a complete-looking
//! directory behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crengine_core::artifacts::{
    AI_PATCHES_FILE, DELTA_FILE, FINDINGS_FILE, MANIFEST_FILE, PHASES_FILE, SCORED_FILE,
};
use crengine_core::delta::{DeltaHistory, FileChange, MergeOutcome, MergeResolution};
use crengine_core::manifest::relative_path;
use crengine_core::{
    compute_delta, consolidate, git, merge, normalize, normalize_scored, obs, ArtifactStore,
    DeltaFinding, DeltaRun, DeltaState, DiffScope, EngineConfig, Finding, Manifest,
    ManifestBuilder, PhasePlan, Result, ReviewSnapshot, RunKind, RunRecord, RunSummary,
    ScopeError, ScoredItem, Scorer, ToolRunSummary,
};
use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::adapters::registry::AnalyzerRegistry;
use crate::adapters::Analyzer;
use crate::ai::{draft_patches, drafter_from_config, AiDrafts, PatchDrafter};
use crate::pool::{AnalyzerJob, WorkerPool};

/// Contents of the delta artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaReport {
    pub base_commit: String,
    pub head_commit: String,
    pub working_tree: bool,
    pub files: Vec<FileChange>,
    pub added: Vec<DeltaFinding>,
    pub superseded: Vec<ScoredItem>,
    pub dropped: Vec<ScoredItem>,
    pub carried: usize,
    pub repathed: usize,
    #[serde(default)]
    pub shifted: usize,
    pub ignored: usize,
    pub resolutions: Vec<MergeResolution>,
}

impl DeltaReport {
    pub fn new(scope: &DiffScope, outcome: &MergeOutcome) -> Self {
        Self {
            base_commit: scope.base_commit.clone(),
            head_commit: scope.head_commit.clone(),
            working_tree: scope.working_tree,
            files: scope.files.clone(),
            added: outcome.added.clone(),
            superseded: outcome.superseded.clone(),
            dropped: outcome.dropped.clone(),
            carried: outcome.carried,
            repathed: outcome.repathed,
            shifted: outcome.shifted,
            ignored: outcome.ignored,
            resolutions: outcome.resolutions.clone(),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub record: RunRecord,
    pub plan: PhasePlan,
    pub delta: Option<DeltaReport>,
}

/// Analyzer chain output before consolidation.
#[derive(Debug, Default)]
struct Analysis {
    findings: Vec<Finding>,
    items: Vec<ScoredItem>,
    tools: Vec<ToolRunSummary>,
    warnings: Vec<String>,
}

struct RunArtifacts<'a> {
    manifest: &'a Manifest,
    findings: &'a [Finding],
    snapshot: &'a ReviewSnapshot,
    plan: &'a PhasePlan,
    ai: Option<&'a AiDrafts>,
    delta: Option<&'a DeltaReport>,
}

struct RunMeta<'a> {
    run_id: &'a str,
    kind: RunKind,
    started_at: DateTime<Utc>,
    commit: Option<String>,
    base_commit: Option<String>,
    config_digest: String,
}

/// Orchestrates review runs over one repository.
pub struct ReviewPipeline {
    repo: PathBuf,
    store: ArtifactStore,
    config: Arc<EngineConfig>,
    registry: AnalyzerRegistry,
    drafter: Option<Arc<dyn PatchDrafter>>,
}

impl ReviewPipeline {
    /// `config` must already be validated (as `EngineConfig::load` does).
    pub fn new(repo: impl Into<PathBuf>, out_dir: impl Into<PathBuf>, config: Arc<EngineConfig>) -> Self {
        Self {
            repo: repo.into(),
            store: ArtifactStore::new(out_dir),
            config,
            registry: AnalyzerRegistry::new(),
            drafter: None,
        }
    }

    pub fn with_registry(mut self, registry: AnalyzerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use `drafter` instead of the one configured under `[ai]`.
    pub fn with_drafter(mut self, drafter: Arc<dyn PatchDrafter>) -> Self {
        self.drafter = Some(drafter);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Review the whole repository.
    pub async fn run_full(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let result = self
            .full(&run_id)
            .instrument(obs::run_span(&run_id, "full"))
            .await;
        if let Err(e) = &result {
            obs::emit_run_failed(&run_id, e);
        }
        result
    }

    /// Re-review only what changed between `base` and `head`.
    ///
    /// `base` defaults to the commit of the latest run; `head = None` means
    /// the working tree (including untracked files).
    pub async fn run_delta(&self, base: Option<&str>, head: Option<&str>) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let result = self
            .delta(&run_id, base, head)
            .instrument(obs::run_span(&run_id, "delta"))
            .await;
        if let Err(e) = &result {
            obs::emit_run_failed(&run_id, e);
        }
        result
    }

    async fn full(&self, run_id: &str) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        let repo = self.repo.canonicalize()?;
        let analyzers = self.registry.resolve(&self.config)?;
        let config_digest = self.config.digest()?;
        obs::emit_run_started(run_id, "full", &repo.display().to_string());

        let commit = if git::is_git_repo(&repo) {
            git::capture_head_sha(&repo).ok()
        } else {
            None
        };
        let manifest = self.manifest_builder(&repo)?.build(commit.clone())?;
        obs::emit_stage_completed(run_id, "manifest", manifest.len());

        let analysis = self.analyze(run_id, &analyzers, &manifest, &repo).await;
        let snapshot = ReviewSnapshot {
            commit: commit.clone(),
            config_digest: config_digest.clone(),
            items: analysis.items,
        };
        let plan = consolidate(&snapshot.items, &self.config.phases);
        obs::emit_stage_completed(run_id, "consolidate", plan.totals.items);

        let mut warnings = analysis.warnings;
        let ai = self.draft(run_id, &snapshot.items, &repo, &mut warnings).await;

        let summary = summarize(&manifest, analysis.findings.len(), &plan, analysis.tools, warnings);
        let meta = RunMeta {
            run_id,
            kind: RunKind::Full,
            started_at,
            commit,
            base_commit: None,
            config_digest,
        };
        let artifacts = RunArtifacts {
            manifest: &manifest,
            findings: &analysis.findings,
            snapshot: &snapshot,
            plan: &plan,
            ai: ai.as_ref(),
            delta: None,
        };
        let (run_dir, record) = self.write_run(meta, summary, artifacts, None)?;

        obs::emit_run_finished(
            run_id,
            started.elapsed().as_millis() as u64,
            record.summary.items,
            record.summary.warnings.len(),
        );
        Ok(RunReport {
            run_dir,
            record,
            plan,
            delta: None,
        })
    }

    async fn delta(&self, run_id: &str, base: Option<&str>, head: Option<&str>) -> Result<RunReport> {
        let started = Instant::now();
        let started_at = Utc::now();
        let repo = self.repo.canonicalize()?;
        let analyzers = self.registry.resolve(&self.config)?;
        let config_digest = self.config.digest()?;
        obs::emit_run_started(run_id, "delta", &repo.display().to_string());

        let mut state = DeltaRun::new(run_id);
        let prior = self.store.load_latest_snapshot()?;
        let base_ref = match (base, prior.as_ref().and_then(|p| p.commit.as_deref())) {
            (Some(base), _) => base.to_string(),
            (None, Some(commit)) => commit.to_string(),
            (None, None) => return Err(ScopeError::NoBase.into()),
        };

        let builder = self.manifest_builder(&repo)?;
        let mut scope = compute_delta(&repo, &base_ref, head)?;
        scope.retain_paths(|path| builder.matches(path));
        state.advance(DeltaState::DiffComputed)?;
        info!(
            base = %scope.base_commit,
            head = %scope.head_commit,
            files = scope.files.len(),
            "delta scope computed"
        );

        let mut warnings = Vec::new();
        if head.is_some() {
            if let Ok(checked_out) = git::capture_head_sha(&repo) {
                if checked_out != scope.head_commit {
                    warnings.push(format!(
                        "head {} is not checked out; analyzed working tree contents",
                        short(&scope.head_commit)
                    ));
                }
            }
        }

        let entries = scope.scan_entries();
        let manifest = builder.build_scoped(Some(scope.head_commit.clone()), &entries)?;
        state.advance(DeltaState::ScopeRestricted)?;
        obs::emit_stage_completed(run_id, "scope", manifest.len());

        let analysis = if manifest.is_empty() {
            Analysis::default()
        } else {
            self.analyze(run_id, &analyzers, &manifest, &repo).await
        };
        state.advance(DeltaState::ReAnalyzed)?;
        warnings.extend(analysis.warnings);

        let prior_items = match prior {
            Some(snapshot) if snapshot.config_digest == config_digest => snapshot.items,
            Some(snapshot) => {
                warnings.push(
                    "previous run used a different configuration; carried findings were rescored"
                        .to_string(),
                );
                let scorer = Scorer::new(&self.config.scoring);
                normalize_scored(scorer.score_all(snapshot.items.into_iter().map(|i| i.finding)))
            }
            None => {
                warnings.push("no previous run; merged set holds changed hunks only".to_string());
                Vec::new()
            }
        };
        let outcome = merge(&prior_items, &analysis.items, &scope);
        state.advance(DeltaState::Merged)?;
        obs::emit_stage_completed(run_id, "merge", outcome.merged.len());

        let snapshot = ReviewSnapshot {
            commit: Some(scope.head_commit.clone()),
            config_digest: config_digest.clone(),
            items: outcome.merged.clone(),
        };
        let plan = consolidate(&snapshot.items, &self.config.phases);
        obs::emit_stage_completed(run_id, "consolidate", plan.totals.items);

        let ai = self.draft(run_id, &snapshot.items, &repo, &mut warnings).await;

        let report = DeltaReport::new(&scope, &outcome);
        let history = self
            .store
            .load_history()?
            .append(&scope.head_commit, &entries, &outcome.added);

        let summary = summarize(&manifest, analysis.findings.len(), &plan, analysis.tools, warnings);
        let meta = RunMeta {
            run_id,
            kind: RunKind::Delta,
            started_at,
            commit: Some(scope.head_commit.clone()),
            base_commit: Some(scope.base_commit.clone()),
            config_digest,
        };
        let artifacts = RunArtifacts {
            manifest: &manifest,
            findings: &analysis.findings,
            snapshot: &snapshot,
            plan: &plan,
            ai: ai.as_ref(),
            delta: Some(&report),
        };
        let (run_dir, record) = self.write_run(meta, summary, artifacts, Some(&history))?;
        state.advance(DeltaState::Done)?;

        obs::emit_run_finished(
            run_id,
            started.elapsed().as_millis() as u64,
            record.summary.items,
            record.summary.warnings.len(),
        );
        Ok(RunReport {
            run_dir,
            record,
            plan,
            delta: Some(report),
        })
    }

    /// Manifest filters for `repo`, leaving out the artifact directory when it
    /// lives inside the repository.
    fn manifest_builder(&self, repo: &Path) -> Result<ManifestBuilder> {
        let builder = ManifestBuilder::new(repo, &self.config.manifest)?;
        let out = self.store.root();
        let out = out.canonicalize().unwrap_or_else(|_| out.to_path_buf());
        Ok(match out.strip_prefix(repo) {
            Ok(inside) if !inside.as_os_str().is_empty() => {
                builder.skip_dir(relative_path(repo, &out))
            }
            _ => builder,
        })
    }

    /// Run the analyzers over `manifest`, then normalize and score.
    async fn analyze(
        &self,
        run_id: &str,
        analyzers: &[Arc<dyn Analyzer>],
        manifest: &Manifest,
        repo: &Path,
    ) -> Analysis {
        let jobs = analyzers
            .iter()
            .map(|analyzer| AnalyzerJob {
                analyzer: Arc::clone(analyzer),
                timeout: Duration::from_secs(self.config.tool(analyzer.name()).timeout_secs),
            })
            .collect();
        let runs = WorkerPool::from_config(&self.config.pipeline)
            .run_all(jobs, &manifest.files, repo)
            .await;

        let mut raw = Vec::new();
        let mut tools = Vec::with_capacity(runs.len());
        let mut warnings = Vec::new();
        for run in runs {
            tools.push(ToolRunSummary {
                tool: run.tool.clone(),
                status: run.status().to_string(),
                findings: run.output.findings.len(),
                malformed_records: run.output.malformed_records,
            });
            for warning in run.output.warnings {
                obs::emit_run_warning(run_id, &run.tool, &warning);
                warnings.push(warning);
            }
            raw.extend(run.output.findings);
        }
        obs::emit_stage_completed(run_id, "analyze", raw.len());

        let findings = normalize(raw, Some(repo));
        obs::emit_stage_completed(run_id, "normalize", findings.len());
        let items = Scorer::new(&self.config.scoring).score_all(findings.iter().cloned());
        obs::emit_stage_completed(run_id, "score", items.len());

        Analysis {
            findings,
            items,
            tools,
            warnings,
        }
    }

    /// Optional AI drafting; every failure becomes a warning.
    async fn draft(
        &self,
        run_id: &str,
        items: &[ScoredItem],
        repo: &Path,
        warnings: &mut Vec<String>,
    ) -> Option<AiDrafts> {
        let drafter = match &self.drafter {
            Some(drafter) => Arc::clone(drafter),
            None => match drafter_from_config(&self.config.ai) {
                Ok(Some(drafter)) => drafter,
                Ok(None) => return None,
                Err(e) => {
                    let message = format!("ai: {e}");
                    obs::emit_run_warning(run_id, "ai", &message);
                    warnings.push(message);
                    return None;
                }
            },
        };

        let drafts = draft_patches(drafter.as_ref(), items, repo, &self.config.ai).await;
        for failure in &drafts.failures {
            warnings.push(format!(
                "ai: {}:{}: {}",
                failure.key.file, failure.key.line, failure.error
            ));
        }
        obs::emit_stage_completed(run_id, "ai", drafts.drafts.len());
        Some(drafts)
    }

    fn write_run(
        &self,
        meta: RunMeta<'_>,
        summary: RunSummary,
        artifacts: RunArtifacts<'_>,
        history: Option<&DeltaHistory>,
    ) -> Result<(PathBuf, RunRecord)> {
        let mut staged = self.store.begin(meta.started_at, meta.commit.as_deref())?;
        staged.write_json(MANIFEST_FILE, artifacts.manifest)?;
        staged.write_json(FINDINGS_FILE, &artifacts.findings)?;
        staged.write_json(SCORED_FILE, artifacts.snapshot)?;
        staged.write_json(PHASES_FILE, artifacts.plan)?;
        if let Some(ai) = artifacts.ai {
            staged.write_json(AI_PATCHES_FILE, ai)?;
        }
        if let Some(delta) = artifacts.delta {
            staged.write_json(DELTA_FILE, delta)?;
        }

        let record = RunRecord {
            run_id: meta.run_id.to_string(),
            kind: meta.kind,
            started_at: meta.started_at,
            finished_at: Utc::now(),
            commit: meta.commit,
            base_commit: meta.base_commit,
            config_digest: meta.config_digest,
            summary,
            artifacts: BTreeMap::new(),
        };
        let run_dir = match history {
            Some(history) => staged.commit_with_history(record, history)?,
            None => staged.commit(record)?,
        };
        let record = self.store.read_record(&run_dir)?;
        Ok((run_dir, record))
    }
}

fn summarize(
    manifest: &Manifest,
    findings: usize,
    plan: &PhasePlan,
    tools: Vec<ToolRunSummary>,
    warnings: Vec<String>,
) -> RunSummary {
    RunSummary {
        files: manifest.len(),
        skipped_files: manifest.skipped,
        findings,
        items: plan.totals.items,
        phase_counts: plan
            .phases
            .iter()
            .map(|g| (g.phase.slug().to_string(), g.items.len()))
            .collect(),
        estimated_hours: plan.totals.estimated_hours,
        tools,
        warnings,
    }
}

fn short(sha: &str) -> &str {
    &sha[..sha.len().min(12)]
}
