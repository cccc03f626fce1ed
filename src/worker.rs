//! Worker loop and per-job review pipeline.
//!
//! The worker runs a single sequential loop: blocking-dequeue a descriptor,
//! drive it through the state machine, repeat. Multiple worker processes may
//! poll the same queue; the queue's blocking pop is the only cross-worker
//! coordination point.
//!
//! The per-job state machine is `processing -> {completed, failed}`:
//!
//! 1. Persist the job record as `processing` (the durability boundary).
//! 2. Consult the analysis cache; a hit completes the job immediately and
//!    skips every downstream call.
//! 3. Gather subject code (changed files if routing hints allow, otherwise
//!    a built-in sample) and run static analysis.
//! 4. Summarize. A summarizer fault degrades the summary, never the job.
//! 5. Persist `completed` and fill the cache.
//! 6. Best-effort: post a review comment and a chat notification.
//!
//! Any fault before step 5's persist transitions the record to `failed`
//! best-effort; if that persist fails too, the record stays in `processing`
//! (a documented gap, there is no reconciliation sweep). A single bad job
//! never stops the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::analyzer::{Analyze, Finding};
use crate::cache::{cache_key, AnalysisBundle, AnalysisCache};
use crate::github::CodeHost;
use crate::job::JobDescriptor;
use crate::notifier::{Notify, ReviewNotification};
use crate::queue::JobQueue;
use crate::readiness::RetryPolicy;
use crate::store::{JobStore, NewJobRecord, StoreError};
use crate::summarizer::{Summarize, Summary};

/// Sample analyzed when a job has no usable routing hints. Deliberately
/// seeded with rule violations so demo submissions produce findings.
const FALLBACK_SAMPLE: &str = r#"function handleLogin(user) {
    console.log("logging in", user);
    var password = "hunter2"; // TODO: read from the vault instead
    return authenticate(user, password);
}
"#;

/// Errors that fail a job.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A critical-path job record persist failed after retries.
    #[error("job record persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// Configuration for the worker loop and pipeline.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Blocking-dequeue timeout per poll.
    pub poll_timeout: Duration,
    /// Pause after a queue transport fault before the next poll.
    pub error_backoff: Duration,
    /// Time-to-live for cache entries written after a miss.
    pub cache_ttl: Duration,
    /// Retry policy for critical-path job record persists.
    pub persist_retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            persist_retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }
}

impl WorkerConfig {
    /// Sets the dequeue poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Sets the pause after queue transport faults.
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Sets the cache entry TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the critical-persist retry policy.
    pub fn with_persist_retry(mut self, policy: RetryPolicy) -> Self {
        self.persist_retry = policy;
        self
    }
}

/// Snapshot of worker statistics.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Jobs that reached `completed`.
    pub jobs_completed: u64,
    /// Jobs that faulted.
    pub jobs_failed: u64,
    /// Completions served from the cache.
    pub cache_hits: u64,
    /// Jobs currently in flight (0 or 1 for a single loop).
    pub active_jobs: u64,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

impl WorkerStats {
    /// Total number of jobs processed.
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared atomic counters behind [`WorkerStats`].
pub struct SharedWorkerStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    cache_hits: AtomicU64,
    total_duration_ms: AtomicU64,
    active_jobs: AtomicU64,
}

impl SharedWorkerStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_jobs: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    /// Takes a consistent-enough snapshot of the counters.
    pub fn snapshot(&self) -> WorkerStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total = completed + failed;
        let average = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        WorkerStats {
            jobs_completed: completed,
            jobs_failed: failed,
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            active_jobs: self.active_jobs.load(Ordering::SeqCst),
            average_job_duration: average,
        }
    }
}

impl Default for SharedWorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The collaborators the pipeline is wired with.
///
/// Constructed once at the process root and handed down by reference,
/// so tests can swap in fakes.
pub struct Collaborators {
    /// Durable job record store.
    pub store: Arc<dyn JobStore>,
    /// Analysis result cache.
    pub cache: Arc<dyn AnalysisCache>,
    /// Static analyzer.
    pub analyzer: Arc<dyn Analyze>,
    /// LLM summarizer.
    pub summarizer: Arc<dyn Summarize>,
    /// Source-hosting client.
    pub code_host: Arc<dyn CodeHost>,
    /// Chat notifier.
    pub notifier: Arc<dyn Notify>,
}

/// Outcome of processing one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The job reached `completed`.
    Completed {
        /// Whether the result was served from the cache.
        cache_hit: bool,
        /// Number of findings in the result.
        findings_count: usize,
    },
    /// The job reached `failed` (or the failure persist itself failed).
    Failed,
}

/// Executes the per-job state machine.
pub struct ReviewPipeline {
    deps: Collaborators,
    config: WorkerConfig,
    stats: Arc<SharedWorkerStats>,
}

impl ReviewPipeline {
    /// Creates a pipeline over the given collaborators.
    pub fn new(deps: Collaborators, config: WorkerConfig) -> Self {
        Self {
            deps,
            config,
            stats: Arc::new(SharedWorkerStats::new()),
        }
    }

    /// Returns the shared statistics handle.
    pub fn stats(&self) -> Arc<SharedWorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Drives one dequeued job to a terminal status.
    ///
    /// Never panics and never returns an error to the loop: faults are
    /// converted into a `failed` record where possible and into logs
    /// otherwise. A crash between the `processing` persist and a terminal
    /// persist strands the record; there is no reconciliation sweep.
    pub async fn process_job(&self, job: &JobDescriptor) -> ProcessOutcome {
        let started = Instant::now();
        info!(
            job_id = %job.job_id,
            pr = job.pr_number,
            title = %job.pr_title,
            action = %job.action,
            "processing job"
        );

        self.stats.increment_active();
        let result = self.run(job, started).await;
        let duration = started.elapsed();
        self.stats.decrement_active();

        match result {
            Ok(outcome) => {
                if let ProcessOutcome::Completed { cache_hit: true, .. } = outcome {
                    self.stats.record_cache_hit();
                }
                self.stats.record_completion(duration);
                info!(
                    job_id = %job.job_id,
                    duration_ms = duration.as_millis() as u64,
                    outcome = ?outcome,
                    "job completed"
                );
                outcome
            }
            Err(e) => {
                self.stats.record_failure(duration);
                error!(job_id = %job.job_id, error = %e, "job failed");
                self.record_failure(job, &e).await;
                ProcessOutcome::Failed
            }
        }
    }

    /// The happy path of the state machine; any `Err` is a job failure.
    async fn run(
        &self,
        job: &JobDescriptor,
        started: Instant,
    ) -> Result<ProcessOutcome, WorkerError> {
        // Step 1: the durability boundary.
        self.persist_processing(job).await?;

        // Step 2: cache-aside short circuit.
        let key = cache_key(job.repo.as_ref(), job.pr_number);
        if let Some(bundle) = self.deps.cache.get(&key).await {
            info!(job_id = %job.job_id, key = %key, "analysis served from cache");
            let message = format!("{} (served from cache)", bundle.message);
            self.persist_completed(job, &message).await?;
            return Ok(ProcessOutcome::Completed {
                cache_hit: true,
                findings_count: bundle.findings_count,
            });
        }

        // Steps 3 and 4: analyze, then summarize (degraded on fault).
        let code = self.collect_code(job).await;
        let findings = self.deps.analyzer.analyze(&code);
        let summary = self.deps.summarizer.summarize(&job.pr_title, &findings).await;

        // Step 5: terminal persist, then cache fill.
        let message = compose_result_message(job.pr_number, findings.len(), &summary);
        self.persist_completed(job, &message).await?;

        let bundle = AnalysisBundle {
            message,
            findings_count: findings.len(),
            summary: summary.text.clone(),
        };
        self.deps.cache.set(&key, &bundle, self.config.cache_ttl).await;

        // Step 6: best-effort side calls.
        self.deliver(job, &findings, &summary, started).await;

        Ok(ProcessOutcome::Completed {
            cache_hit: false,
            findings_count: findings.len(),
        })
    }

    /// Gathers the code to analyze: changed files when routing hints and
    /// credentials allow, otherwise the built-in sample.
    async fn collect_code(&self, job: &JobDescriptor) -> String {
        if let Some(repo) = &job.repo {
            if self.deps.code_host.is_enabled() {
                match self
                    .deps
                    .code_host
                    .fetch_changed_files(repo, job.pr_number)
                    .await
                {
                    Ok(files) if !files.is_empty() => {
                        debug!(job_id = %job.job_id, files = files.len(), "fetched changed files");
                        return files
                            .iter()
                            .map(|f| format!("// file: {}\n{}", f.filename, f.content))
                            .collect::<Vec<_>>()
                            .join("\n");
                    }
                    Ok(_) => {
                        info!(job_id = %job.job_id, "no analyzable files changed, using sample");
                    }
                    Err(e) => {
                        warn!(job_id = %job.job_id, error = %e, "file fetch failed, using sample");
                    }
                }
            }
        }

        FALLBACK_SAMPLE.to_string()
    }

    /// Best-effort comment and notification delivery.
    async fn deliver(
        &self,
        job: &JobDescriptor,
        findings: &[Finding],
        summary: &Summary,
        started: Instant,
    ) {
        if let Some(repo) = &job.repo {
            if self.deps.code_host.is_enabled() {
                let body = compose_comment(job.pr_number, findings, summary);
                if let Err(e) = self
                    .deps
                    .code_host
                    .post_comment(repo, job.pr_number, &body)
                    .await
                {
                    warn!(job_id = %job.job_id, error = %e, "review comment failed");
                }
            }
        }

        if self.deps.notifier.is_enabled() {
            let notification = ReviewNotification {
                pr_number: job.pr_number,
                pr_title: job.pr_title.clone(),
                repo: job.repo.clone(),
                findings_count: findings.len(),
                summary: summary.text.clone(),
                processing_secs: started.elapsed().as_secs_f64(),
            };
            if let Err(e) = self.deps.notifier.review_completed(&notification).await {
                warn!(job_id = %job.job_id, error = %e, "chat notification failed");
            }
        }
    }

    /// Best-effort transition to `failed` plus an error notification.
    async fn record_failure(&self, job: &JobDescriptor, fault: &WorkerError) {
        let message = format!("Error: {fault}");
        if let Err(e) = self.deps.store.mark_failed(job.job_id, &message).await {
            error!(
                job_id = %job.job_id,
                error = %e,
                "could not record job failure; record may remain in processing"
            );
        }

        if self.deps.notifier.is_enabled() {
            if let Err(e) = self
                .deps
                .notifier
                .review_failed(job.pr_number, &fault.to_string())
                .await
            {
                warn!(job_id = %job.job_id, error = %e, "failure notification failed");
            }
        }
    }

    async fn persist_processing(&self, job: &JobDescriptor) -> Result<(), StoreError> {
        let record = NewJobRecord {
            job_id: job.job_id,
            pr_number: job.pr_number,
            pr_title: job.pr_title.clone(),
        };

        let policy = self.config.persist_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.deps.store.insert_processing(&record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < policy.max_attempts => {
                    warn!(
                        job_id = %job.job_id,
                        attempt,
                        error = %e,
                        "processing persist failed, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn persist_completed(
        &self,
        job: &JobDescriptor,
        message: &str,
    ) -> Result<(), StoreError> {
        let policy = self.config.persist_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.deps.store.mark_completed(job.job_id, message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < policy.max_attempts => {
                    warn!(
                        job_id = %job.job_id,
                        attempt,
                        error = %e,
                        "completion persist failed, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Builds the job record message for a fresh analysis.
fn compose_result_message(pr_number: u64, findings_count: usize, summary: &Summary) -> String {
    format!(
        "Analyzed PR #{pr_number}: {findings_count} finding(s). Summary: {}",
        summary.text
    )
}

/// Builds the markdown review comment.
fn compose_comment(pr_number: u64, findings: &[Finding], summary: &Summary) -> String {
    let mut body = format!(
        "## Automated Review of PR #{pr_number}\n\n{} finding(s) from static checks.\n",
        findings.len()
    );

    for finding in findings {
        body.push_str(&format!(
            "- **{}** line {}: {}\n",
            finding.severity.to_string().to_uppercase(),
            finding.line,
            finding.message
        ));
    }

    body.push_str(&format!("\n### AI Summary\n{}\n", summary.text));
    body
}

/// A single worker: one sequential dequeue-process loop.
pub struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    pipeline: ReviewPipeline,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Worker {
    /// Creates a worker over a queue and a wired pipeline.
    pub fn new(
        id: impl Into<String>,
        queue: Arc<JobQueue>,
        pipeline: ReviewPipeline,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            pipeline,
            shutdown_rx,
        }
    }

    /// Returns the worker's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Main worker loop.
    ///
    /// Polls until a shutdown signal arrives. A queue transport fault pauses
    /// the loop for the configured backoff and polling resumes; the loop
    /// never exits because a single poll cycle or job failed.
    pub async fn run(mut self) {
        info!(worker_id = %self.id, queue = %self.queue.queue_name(), "worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.queue.dequeue(self.pipeline.config.poll_timeout).await {
                Ok(Some(job)) => {
                    self.pipeline.process_job(&job).await;
                }
                Ok(None) => {
                    debug!(worker_id = %self.id, "no jobs available");
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "failed to dequeue job");
                    tokio::time::sleep(self.pipeline.config.error_backoff).await;
                }
            }
        }

        let stats = self.pipeline.stats.snapshot();
        info!(
            worker_id = %self.id,
            completed = stats.jobs_completed,
            failed = stats.jobs_failed,
            cache_hits = stats.cache_hits,
            "worker stopped"
        );
    }
}
