//! The mapping job state machine and its owning manager.
//!
//! One spawned task per job is the single writer of that job's record;
//! pollers read atomically-snapshotted clones through the shared map.
//! Cancellation is cooperative — a flag probed between retry attempts and
//! between fields — so a job never leaves a half-written adapter in the
//! store.

use crate::adapter::store::AdapterStore;
use crate::discovery::builder::{self, BuildOptions, BuildOutcome};
use crate::discovery::fetcher::{backoff_delay, FetchError, FetchedPage, PageSource};
use crate::discovery::fingerprint;
use crate::job::{JobOptions, JobPriority, JobStatus, MappingJob, PageTarget};
use scraper::Html;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Tuning for the pre-flight fetch.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Hard deadline for one fetch attempt.
    pub fetch_timeout_ms: u64,
    /// Attempt ceiling for transient fetch failures.
    pub max_fetch_attempts: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            max_fetch_attempts: 3,
        }
    }
}

/// Submission parameters for one mapping job.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub shop_id: String,
    pub target: PageTarget,
    pub theme_id: Option<String>,
    pub priority: JobPriority,
    pub options: JobOptions,
}

/// Owns every mapping job: accepts submissions, spawns runner tasks,
/// answers polls, and relays cancel requests.
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<String, MappingJob>>>,
    /// (shop, target) → active job id, enforcing at most one live job
    /// per target. Duplicate submissions coalesce onto the entry here.
    active: Arc<RwLock<HashMap<String, String>>>,
    cancel_flags: Arc<RwLock<HashMap<String, Arc<AtomicBool>>>>,
    store: Arc<AdapterStore>,
    source: Arc<dyn PageSource>,
    config: RunnerConfig,
}

impl JobManager {
    pub fn new(store: Arc<AdapterStore>, source: Arc<dyn PageSource>, config: RunnerConfig) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(RwLock::new(HashMap::new())),
            cancel_flags: Arc::new(RwLock::new(HashMap::new())),
            store,
            source,
            config,
        }
    }

    /// Accept a mapping job. If the same (shop, target) already has a
    /// live job, the submission coalesces onto it and that job's current
    /// snapshot is returned instead of a new one.
    pub async fn submit(&self, req: SubmitRequest) -> MappingJob {
        let job = MappingJob::new(req.shop_id, req.target, req.theme_id, req.priority, req.options);
        let key = job.active_key();

        // Check-and-claim under one write lock so two submissions cannot
        // race into parallel jobs for the same target.
        {
            let mut active = self.active.write().await;
            if let Some(existing_id) = active.get(&key) {
                if let Some(existing) = self.jobs.read().await.get(existing_id) {
                    if !existing.status.is_terminal() {
                        debug!("coalescing submission for {key} onto job {existing_id}");
                        return existing.clone();
                    }
                }
            }
            active.insert(key, job.id.clone());
        }

        let flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .write()
            .await
            .insert(job.id.clone(), Arc::clone(&flag));
        self.jobs.write().await.insert(job.id.clone(), job.clone());

        info!("job {} accepted for {}", job.id, job.active_key());
        let manager = self.clone();
        let id = job.id.clone();
        tokio::spawn(async move {
            manager.run(&id, flag).await;
        });

        job
    }

    /// Snapshot a job's current state. Terminal jobs are retained for
    /// audit, so this answers for finished jobs too.
    pub async fn poll(&self, id: &str) -> Option<MappingJob> {
        self.jobs.read().await.get(id).cloned()
    }

    /// All job snapshots, newest first.
    pub async fn list(&self) -> Vec<MappingJob> {
        let mut jobs: Vec<MappingJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Request cancellation. Pending jobs cancel immediately; live jobs
    /// observe the flag at their next between-fields check. Returns
    /// false for unknown or already-terminal jobs.
    pub async fn cancel(&self, id: &str) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        if job.status == JobStatus::Pending {
            job.cancel();
            let key = job.active_key();
            drop(jobs);
            // The runner task is already spawned; flag it so it bails out
            // instead of discovering and persisting for a cancelled job.
            if let Some(flag) = self.cancel_flags.read().await.get(id) {
                flag.store(true, Ordering::SeqCst);
            }
            self.release(id, &key).await;
            return true;
        }
        drop(jobs);

        if let Some(flag) = self.cancel_flags.read().await.get(id) {
            flag.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    // ── Runner task ──────────────────────────────────────────────────────

    async fn run(&self, id: &str, cancel: Arc<AtomicBool>) {
        let Some(job) = self.poll(id).await else {
            return;
        };
        let key = job.active_key();

        // Cancelled while still pending (between spawn and first poll).
        if self.poll(id).await.map(|j| j.status.is_terminal()).unwrap_or(true) {
            self.release(id, &key).await;
            return;
        }

        self.update(id, |j| j.set_status(JobStatus::Processing)).await;

        let outcome = self.execute(&job, &cancel).await;
        match outcome {
            Ok(Some(adapter)) => {
                self.update(id, |j| j.complete(adapter)).await;
                info!("job {id} completed");
            }
            Ok(None) => {
                self.update(id, |j| j.cancel()).await;
                info!("job {id} cancelled");
            }
            Err(cause) => {
                warn!("job {id} failed: {cause}");
                self.update(id, |j| j.fail(cause)).await;
            }
        }

        self.release(id, &key).await;
    }

    /// The job body: fetch, fingerprint, reuse-or-build, persist.
    /// `Ok(None)` means a cancel request took effect.
    async fn execute(
        &self,
        job: &MappingJob,
        cancel: &Arc<AtomicBool>,
    ) -> Result<Option<crate::adapter::ThemeAdapter>, String> {
        let url = job
            .target
            .resolve_url(&job.shop_id)
            .ok_or_else(|| format!("target {:?} cannot be resolved to a fetchable url", job.target))?;

        let page = match self.fetch_with_retry(&url, cancel).await {
            Ok(page) => page,
            Err(None) => return Ok(None),
            Err(Some(e)) => return Err(e.to_string()),
        };

        // Fingerprint on the blocking pool: scraper types are !Send.
        let html = page.html;
        let fp = tokio::task::spawn_blocking({
            let html = html.clone();
            move || fingerprint::fingerprint(&Html::parse_document(&html))
        })
        .await
        .map_err(|e| format!("fingerprint task panicked: {e}"))?;

        debug!("job {} fingerprint {fp}", job.id);

        if cancel.load(Ordering::SeqCst) {
            return Ok(None);
        }

        if !job.options.refresh {
            if let Some(existing) = self.store.get(&fp) {
                info!("job {} reusing stored adapter for {fp}", job.id);
                return Ok(Some(existing));
            }
        }

        self.update(&job.id, |j| j.set_status(JobStatus::Running)).await;

        let build_options = BuildOptions {
            field_types: job.options.field_types.clone(),
            confidence_floor: job.options.confidence_floor,
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, usize)>();
        let build_cancel = Arc::clone(cancel);
        let build_fp = fp.clone();
        let handle = tokio::task::spawn_blocking(move || {
            builder::build(
                &html,
                &build_fp,
                &build_options,
                move |done, total| {
                    let _ = tx.send((done, total));
                },
                move || build_cancel.load(Ordering::SeqCst),
            )
        });

        // Relay per-field progress onto the job record while the build
        // runs; the channel closes when the builder drops its sender.
        while let Some((done, total)) = rx.recv().await {
            let pct = if total == 0 {
                99
            } else {
                ((done * 100) / total) as u8
            };
            self.update(&job.id, |j| j.raise_progress(pct)).await;
        }

        let outcome = handle
            .await
            .map_err(|e| format!("scoring task panicked: {e}"))?;

        match outcome {
            BuildOutcome::Cancelled => Ok(None),
            BuildOutcome::Completed(adapter) => {
                // A cancel that lands after the last field but before the
                // store write still wins: nothing is persisted.
                if cancel.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                self.store
                    .put(adapter.clone())
                    .map_err(|e| format!("persisting adapter failed: {e}"))?;
                Ok(Some(adapter))
            }
        }
    }

    /// Fetch with a deadline per attempt and backoff on transient errors.
    /// `Err(None)` signals a cancel observed between attempts.
    async fn fetch_with_retry(
        &self,
        url: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<FetchedPage, Option<FetchError>> {
        let deadline = Duration::from_millis(self.config.fetch_timeout_ms);
        let mut attempt = 1u32;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(None);
            }

            let result = match tokio::time::timeout(deadline, self.source.fetch(url)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.config.fetch_timeout_ms,
                }),
            };

            match result {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.config.max_fetch_attempts => {
                    debug!("fetch attempt {attempt} failed ({e}), backing off");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(Some(e)),
            }
        }
    }

    // ── Record plumbing ──────────────────────────────────────────────────

    async fn update(&self, id: &str, f: impl FnOnce(&mut MappingJob)) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            f(job);
        }
    }

    /// Free the active slot and cancel flag once a job reaches a
    /// terminal state.
    async fn release(&self, id: &str, key: &str) {
        let mut active = self.active.write().await;
        if active.get(key).map(String::as_str) == Some(id) {
            active.remove(key);
        }
        drop(active);
        self.cancel_flags.write().await.remove(id);
    }
}
