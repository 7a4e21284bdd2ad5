//! Bounded analyzer execution.
//!
//! Every analyzer runs as its own task on a `JoinSet`; a `Semaphore` caps how
//! many run at once. Results are collected by the calling task only, in
//! completion order, and returned in job order. A run-level deadline aborts
//! whatever is still in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crengine_core::{obs, FileRecord, PipelineConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use crate::adapters::{AdapterOutput, Analyzer};
use crate::error::AdapterError;

/// One analyzer scheduled with its own timeout.
#[derive(Clone)]
pub struct AnalyzerJob {
    pub analyzer: Arc<dyn Analyzer>,
    pub timeout: Duration,
}

/// Outcome of one analyzer.
#[derive(Debug)]
pub struct AnalyzerRun {
    pub tool: String,

    /// Files the analyzer accepted.
    pub files: usize,

    /// No file was accepted, so the analyzer never ran.
    pub skipped: bool,

    pub duration_ms: u64,

    pub output: AdapterOutput,
}

impl AnalyzerRun {
    pub fn status(&self) -> &'static str {
        if self.skipped {
            "skipped"
        } else {
            self.output.status()
        }
    }
}

type TaskResult = (usize, AdapterOutput, u64);

#[derive(Debug, Clone)]
pub struct WorkerPool {
    max_concurrency: usize,
    run_timeout: Duration,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, run_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            run_timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_concurrency,
            Duration::from_secs(config.run_timeout_secs),
        )
    }

    /// Run every job over the files it accepts. Waits until all jobs have
    /// completed or failed; never fails itself.
    pub async fn run_all(
        &self,
        jobs: Vec<AnalyzerJob>,
        files: &[FileRecord],
        cwd: &Path,
    ) -> Vec<AnalyzerRun> {
        let deadline = Instant::now() + self.run_timeout;
        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let cwd: Arc<PathBuf> = Arc::new(cwd.to_path_buf());

        let mut slots: Vec<Option<AnalyzerRun>> = Vec::with_capacity(jobs.len());
        let mut meta: Vec<(String, usize)> = Vec::with_capacity(jobs.len());
        let mut join_set: JoinSet<TaskResult> = JoinSet::new();

        for (idx, job) in jobs.into_iter().enumerate() {
            let tool = job.analyzer.name().to_string();
            let accepted: Vec<FileRecord> = files
                .iter()
                .filter(|f| job.analyzer.accepts(f))
                .cloned()
                .collect();
            meta.push((tool.clone(), accepted.len()));

            if accepted.is_empty() {
                debug!(tool = %tool, "no accepted files; skipping analyzer");
                slots.push(Some(AnalyzerRun {
                    tool,
                    files: 0,
                    skipped: true,
                    duration_ms: 0,
                    output: AdapterOutput::default(),
                }));
                continue;
            }
            slots.push(None);

            let sem = Arc::clone(&sem);
            let cwd = Arc::clone(&cwd);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let start = Instant::now();
                let output = job.analyzer.execute(&accepted, &cwd, job.timeout).await;
                (idx, output, start.elapsed().as_millis() as u64)
            });
        }

        let mut timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok(result))) => record(&mut slots, &meta, result),
                Ok(Some(Err(e))) => debug!(error = %e, "analyzer task failed"),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    join_set.abort_all();
                    // Drain so aborted children are killed before returning;
                    // anything that finished in the meantime still counts.
                    while let Some(joined) = join_set.join_next().await {
                        if let Ok(result) = joined {
                            record(&mut slots, &meta, result);
                        }
                    }
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(meta)
            .map(|(slot, (tool, files))| {
                slot.unwrap_or_else(|| {
                    let error = if timed_out {
                        AdapterError::Timeout {
                            tool: tool.clone(),
                            after: self.run_timeout,
                        }
                    } else {
                        AdapterError::Task {
                            tool: tool.clone(),
                            message: "analyzer task panicked".to_string(),
                        }
                    };
                    obs::emit_adapter_degraded(&tool, &error);
                    AnalyzerRun {
                        tool,
                        files,
                        skipped: false,
                        duration_ms: 0,
                        output: AdapterOutput::failed(error),
                    }
                })
            })
            .collect()
    }
}

fn record(slots: &mut [Option<AnalyzerRun>], meta: &[(String, usize)], result: TaskResult) {
    let (idx, output, duration_ms) = result;
    let (tool, files) = &meta[idx];
    match &output.error {
        Some(e) => obs::emit_adapter_degraded(tool, e),
        None => obs::emit_adapter_finished(
            tool,
            output.findings.len(),
            output.malformed_records,
            duration_ms,
        ),
    }
    slots[idx] = Some(AnalyzerRun {
        tool: tool.clone(),
        files: *files,
        skipped: false,
        duration_ms,
        output,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crengine_core::{Finding, Language, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Sleepy {
        name: &'static str,
        delay: Duration,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Analyzer for Sleepy {
        fn name(&self) -> &str {
            self.name
        }

        fn accepts(&self, file: &FileRecord) -> bool {
            file.language == Some(Language::Python)
        }

        async fn execute(&self, files: &[FileRecord], _: &Path, _: Duration) -> AdapterOutput {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            AdapterOutput {
                findings: files
                    .iter()
                    .map(|f| Finding::new(self.name, &f.path, 1, "R", Severity::Low, "m"))
                    .collect(),
                ..AdapterOutput::default()
            }
        }
    }

    fn file(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            language: Language::detect(Path::new(path)),
            size: 1,
            content_hash: "h".to_string(),
            hunks: None,
        }
    }

    fn jobs(delays: &[(&'static str, u64)]) -> (Vec<AnalyzerJob>, Arc<AtomicUsize>) {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs = delays
            .iter()
            .map(|&(name, ms)| AnalyzerJob {
                analyzer: Arc::new(Sleepy {
                    name,
                    delay: Duration::from_millis(ms),
                    running: Arc::clone(&running),
                    peak: Arc::clone(&peak),
                }),
                timeout: Duration::from_secs(60),
            })
            .collect();
        (jobs, peak)
    }

    #[tokio::test]
    async fn results_follow_job_order_not_completion_order() {
        let (jobs, _) = jobs(&[("slow", 120), ("fast", 1), ("mid", 40)]);
        let pool = WorkerPool::new(3, Duration::from_secs(30));
        let runs = pool.run_all(jobs, &[file("a.py")], Path::new(".")).await;
        let tools: Vec<&str> = runs.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(tools, vec!["slow", "fast", "mid"]);
        assert!(runs.iter().all(|r| r.status() == "ok"));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let (jobs, peak) = jobs(&[("a", 30), ("b", 30), ("c", 30), ("d", 30), ("e", 30)]);
        let pool = WorkerPool::new(2, Duration::from_secs(30));
        let runs = pool.run_all(jobs, &[file("a.py")], Path::new(".")).await;
        assert_eq!(runs.len(), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn unaccepted_files_skip_the_analyzer() {
        let (jobs, _) = jobs(&[("py", 1)]);
        let pool = WorkerPool::new(1, Duration::from_secs(30));
        let runs = pool.run_all(jobs, &[file("a.js")], Path::new(".")).await;
        assert!(runs[0].skipped);
        assert_eq!(runs[0].status(), "skipped");
    }

    #[tokio::test]
    async fn run_deadline_marks_unfinished_analyzers_as_timeouts() {
        let (jobs, _) = jobs(&[("quick", 1), ("stuck", 10_000)]);
        let pool = WorkerPool::new(2, Duration::from_millis(300));
        let started = std::time::Instant::now();
        let runs = pool.run_all(jobs, &[file("a.py")], Path::new(".")).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(runs[0].status(), "ok");
        assert_eq!(runs[0].output.findings.len(), 1);
        assert_eq!(runs[1].status(), "timeout");
        assert!(runs[1].output.findings.is_empty());
        assert_eq!(runs[1].output.warnings.len(), 1);
    }
}
