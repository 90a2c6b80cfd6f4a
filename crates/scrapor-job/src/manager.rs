use crate::store::JobStore;
use async_trait::async_trait;
use scrapor_core::{Job, JobStatus, ScraporError, ScraporResult, StepResult, StepStatus, Strategy};
use scrapor_workflow::{
    CancelFlag, ExecutionMode, StepObserver, WorkflowPlan, WorkflowRunner,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Default fraction set when a job enters `processing`, before any step
/// has produced output.
pub const DEFAULT_INITIAL_PROGRESS: f64 = 0.1;

/// Owns the job state machine: submission, synchronous execution,
/// progress/result publication, cancellation, and finalization.
///
/// Execution is single-owner: one job is driven by exactly one task for
/// its whole lifetime. The cancellation registry is process-scoped state
/// owned by this manager, so tests can construct isolated instances.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    runner: WorkflowRunner,
    initial_progress: f64,
    cancels: Mutex<HashMap<Uuid, CancelFlag>>,
}

impl JobManager {
    /// Build a manager over a store and a workflow runner.
    pub fn new(store: Arc<dyn JobStore>, runner: WorkflowRunner, initial_progress: f64) -> Self {
        Self {
            store,
            runner,
            initial_progress: initial_progress.clamp(0.0, 1.0),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Construct and persist a new pending job. Never blocks on any
    /// downstream agent.
    pub async fn submit(
        &self,
        target: impl Into<String>,
        strategy: Strategy,
    ) -> ScraporResult<Job> {
        let job = Job::new(target, strategy);
        self.store.create(&job).await?;
        info!(job_id = %job.id, strategy = %job.strategy, "Job submitted");
        Ok(job)
    }

    /// Read the current snapshot of a job.
    pub async fn status(&self, id: Uuid) -> ScraporResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ScraporError::Job(format!("job {id} not found")))
    }

    /// Page of jobs, most recent first, plus the total count.
    pub async fn list(&self, skip: usize, limit: usize) -> ScraporResult<(Vec<Job>, usize)> {
        self.store.list(skip, limit).await
    }

    /// Cancel a job. A pending job transitions immediately; a processing
    /// job gets its cooperative flag set — in-flight agent calls finish,
    /// no further steps are dispatched.
    pub async fn cancel(&self, id: Uuid) -> ScraporResult<Job> {
        let mut job = self.status(id).await?;
        match job.status {
            JobStatus::Pending => {
                job.mark_cancelled();
                self.store.update(&job).await?;
                // A run may have read the job as pending concurrently;
                // its registered flag stops it before any dispatch.
                if let Some(flag) = self.cancels.lock().await.get(&id) {
                    flag.store(true, Ordering::SeqCst);
                }
                info!(job_id = %id, "Pending job cancelled");
                Ok(job)
            }
            JobStatus::Processing => {
                if let Some(flag) = self.cancels.lock().await.get(&id) {
                    flag.store(true, Ordering::SeqCst);
                    info!(job_id = %id, "Cancellation requested for running job");
                }
                Ok(job)
            }
            // Terminal jobs are read-only.
            _ => Ok(job),
        }
    }

    /// Execute a job synchronously to a terminal status.
    ///
    /// Used for both foreground submission ("wait for result") and
    /// background submission (spawned, polled later). Job-level failures
    /// never escape: the returned job is always terminal unless the job
    /// was already terminal on entry.
    pub async fn run(
        &self,
        id: Uuid,
        plan: &WorkflowPlan,
        mode: ExecutionMode,
    ) -> ScraporResult<Job> {
        // The flag is registered before the status read: a cancellation
        // landing between that read and the processing write still stops
        // the run before any step is dispatched.
        let cancel: CancelFlag = Arc::new(AtomicBool::new(false));
        self.cancels.lock().await.insert(id, Arc::clone(&cancel));

        let mut job = match self.status(id).await {
            Ok(job) => job,
            Err(e) => {
                self.cancels.lock().await.remove(&id);
                return Err(e);
            }
        };
        if job.status.is_terminal() {
            // Cancelled (or otherwise finished) before dispatch.
            self.cancels.lock().await.remove(&id);
            return Ok(job);
        }

        job.mark_processing(self.initial_progress);
        if let Err(e) = self.store.update(&job).await {
            self.cancels.lock().await.remove(&id);
            return Ok(self.fail_for_store_error(job, &e).await);
        }
        info!(job_id = %id, steps = plan.len(), "Job processing");

        let observer = Arc::new(ProgressObserver {
            store: Arc::clone(&self.store),
            job: Mutex::new(job),
            completed: AtomicUsize::new(0),
            total: plan.len(),
            initial_progress: self.initial_progress,
            store_failed: AtomicBool::new(false),
            cancel: Arc::clone(&cancel),
        });

        let outcome = self
            .runner
            .run(
                &observer.target().await,
                plan,
                mode,
                &cancel,
                Arc::clone(&observer) as Arc<dyn StepObserver>,
            )
            .await;

        self.cancels.lock().await.remove(&id);
        let mut job = observer.job.lock().await.clone();

        // Rebuild results in declaration order so payloads are stable
        // and diffable across runs with the same inputs.
        let mut ordered = serde_json::Map::new();
        for result in &outcome {
            if let (StepStatus::Success, Some(output)) = (result.status, &result.output) {
                ordered.insert(result.step_name.clone(), output.clone());
            }
        }
        job.results = ordered;

        if observer.store_failed.load(Ordering::SeqCst) {
            job.mark_failed("persistence error: job write failed mid-run");
            self.persist_final(&job).await;
            return Ok(job);
        }

        let hard_failure = outcome.iter().zip(plan.steps()).find(|(result, step)| {
            result.status == StepStatus::Error && !step.continue_on_error
        });

        if let Some((result, _)) = hard_failure {
            let cause = result.error.as_deref().unwrap_or("unknown error");
            job.mark_failed(format!("step '{}' failed: {cause}", result.step_name));
            warn!(job_id = %id, step = %result.step_name, "Job failed");
        } else if cancel.load(Ordering::SeqCst) {
            job.mark_cancelled();
            info!(job_id = %id, "Job cancelled");
        } else {
            job.mark_completed();
            info!(job_id = %id, stages = job.results.len(), "Job completed");
        }

        self.persist_final(&job).await;
        Ok(job)
    }

    /// Persist a terminal state, retrying best-effort once.
    async fn persist_final(&self, job: &Job) {
        if let Err(first) = self.store.update(job).await {
            warn!(job_id = %job.id, error = %first, "Final job write failed, retrying once");
            if let Err(second) = self.store.update(job).await {
                error!(job_id = %job.id, error = %second, "Final job write failed twice, giving up");
            }
        }
    }

    async fn fail_for_store_error(&self, mut job: Job, cause: &ScraporError) -> Job {
        job.mark_failed(format!("persistence error: {cause}"));
        self.persist_final(&job).await;
        job
    }
}

/// Publishes each step's outcome into the job as it resolves: merges
/// successful output, advances progress by `1/N`, and persists before
/// the runner dispatches further work.
struct ProgressObserver {
    store: Arc<dyn JobStore>,
    job: Mutex<Job>,
    completed: AtomicUsize,
    total: usize,
    initial_progress: f64,
    store_failed: AtomicBool,
    cancel: CancelFlag,
}

impl ProgressObserver {
    async fn target(&self) -> String {
        self.job.lock().await.target.clone()
    }
}

#[async_trait]
impl StepObserver for ProgressObserver {
    async fn on_step(&self, result: &StepResult) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let progress = self.initial_progress + done as f64 / self.total.max(1) as f64;

        let mut job = self.job.lock().await;
        match (&result.status, &result.output) {
            (StepStatus::Success, Some(output)) => {
                job.record_stage(&result.step_name, output.clone(), progress);
            }
            _ => job.advance_progress(progress),
        }

        if let Err(e) = self.store.update(&job).await {
            warn!(job_id = %job.id, step = %result.step_name, error = %e, "Progress write failed");
            self.store_failed.store(true, Ordering::SeqCst);
            // Stop dispatching further steps; the run cannot be durable.
            self.cancel.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use scrapor_core::{StepKind, WorkflowStep};
    use scrapor_workflow::StepExecutor;

    struct ScriptedExecutor {
        outcomes: HashMap<String, Result<serde_json::Value, String>>,
    }

    impl ScriptedExecutor {
        fn new(outcomes: Vec<(&str, Result<serde_json::Value, String>)>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: outcomes
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _target: &str,
            step: &WorkflowStep,
            _upstream: Option<&serde_json::Value>,
        ) -> StepResult {
            match self.outcomes.get(&step.name) {
                Some(Ok(v)) => StepResult::success(&step.name, v.clone(), 1),
                Some(Err(e)) => StepResult::error(&step.name, e.clone(), 1),
                None => StepResult::error(&step.name, "unscripted step", 0),
            }
        }
    }

    fn step(name: &str) -> WorkflowStep {
        WorkflowStep::new(name, StepKind::Render { wait_for: None })
    }

    fn manager(executor: Arc<dyn StepExecutor>) -> (JobManager, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        let manager = JobManager::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            WorkflowRunner::new(executor),
            DEFAULT_INITIAL_PROGRESS,
        );
        (manager, store)
    }

    #[tokio::test]
    async fn test_successful_run_completes_with_full_progress() {
        let exec = ScriptedExecutor::new(vec![
            ("a", Ok(serde_json::json!({"x": 1}))),
            ("b", Ok(serde_json::json!({"y": 2}))),
        ]);
        let (manager, _) = manager(exec);

        let job = manager
            .submit("https://example.com", Strategy::FullPipeline)
            .await
            .unwrap();
        let plan = WorkflowPlan::new(vec![step("a"), step("b")]).unwrap();
        let done = manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 1.0);
        let keys: Vec<&String> = done.results.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn test_hard_failure_names_first_failing_step_and_keeps_partials() {
        let exec = ScriptedExecutor::new(vec![
            ("a", Ok(serde_json::json!({"x": 1}))),
            ("b", Err("agent returned 500".to_string())),
            ("c", Ok(serde_json::json!({"z": 3}))),
        ]);
        let (manager, _) = manager(exec);

        let job = manager
            .submit("https://example.com", Strategy::FullPipeline)
            .await
            .unwrap();
        let plan = WorkflowPlan::new(vec![step("a"), step("b"), step("c")]).unwrap();
        let done = manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        let err = done.error.as_deref().unwrap();
        assert!(err.contains("'b'"));
        assert!(err.contains("500"));
        // a's output survives the failure; c never ran.
        assert!(done.results.contains_key("a"));
        assert!(!done.results.contains_key("c"));
    }

    #[tokio::test]
    async fn test_first_step_failure_leaves_no_results() {
        let exec = ScriptedExecutor::new(vec![
            ("a", Err("boom".to_string())),
            ("b", Ok(serde_json::json!(1))),
            ("c", Ok(serde_json::json!(2))),
        ]);
        let (manager, _) = manager(exec);

        let job = manager
            .submit("https://example.com", Strategy::FullPipeline)
            .await
            .unwrap();
        let plan = WorkflowPlan::new(vec![step("a"), step("b"), step("c")]).unwrap();
        let done = manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.results.is_empty());
        assert!(done.error.as_deref().unwrap().contains("'a'"));
    }

    #[tokio::test]
    async fn test_absorbed_failure_still_completes() {
        let exec = ScriptedExecutor::new(vec![
            ("a", Err("timeout".to_string())),
            ("b", Ok(serde_json::json!({"ok": true}))),
        ]);
        let (manager, _) = manager(exec);

        let job = manager
            .submit("https://example.com", Strategy::FullPipeline)
            .await
            .unwrap();
        let plan =
            WorkflowPlan::new(vec![step("a").continue_on_error(), step("b")]).unwrap();
        let done = manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 1.0);
        // Only b produced output.
        let keys: Vec<&String> = done.results.keys().collect();
        assert_eq!(keys, vec!["b"]);
    }

    #[tokio::test]
    async fn test_progress_is_published_per_step() {
        // Observe the store snapshot from within a step by sandwiching
        // a probe between two scripted steps.
        struct ProbingExecutor {
            store: Arc<MemoryJobStore>,
            snapshots: Mutex<Vec<f64>>,
        }

        #[async_trait]
        impl StepExecutor for ProbingExecutor {
            async fn execute(
                &self,
                _target: &str,
                step: &WorkflowStep,
                _upstream: Option<&serde_json::Value>,
            ) -> StepResult {
                let (jobs, _) = self.store.list(0, 10).await.unwrap();
                if let Some(job) = jobs.first() {
                    self.snapshots.lock().await.push(job.progress);
                }
                StepResult::success(&step.name, serde_json::json!(1), 1)
            }
        }

        let store = Arc::new(MemoryJobStore::new());
        let exec = Arc::new(ProbingExecutor {
            store: Arc::clone(&store),
            snapshots: Mutex::new(Vec::new()),
        });
        let manager = JobManager::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            WorkflowRunner::new(exec.clone()),
            0.1,
        );

        let job = manager
            .submit("https://example.com", Strategy::FullPipeline)
            .await
            .unwrap();
        let plan = WorkflowPlan::new(vec![step("a"), step("b")]).unwrap();
        manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();

        let snapshots = exec.snapshots.lock().await;
        // First step sees the initial fraction; second sees 0.1 + 1/2.
        assert_eq!(snapshots.len(), 2);
        assert!((snapshots[0] - 0.1).abs() < 1e-9);
        assert!((snapshots[1] - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let exec = ScriptedExecutor::new(vec![]);
        let (manager, _) = manager(exec);

        let job = manager
            .submit("https://example.com", Strategy::DiscoveryOnly)
            .await
            .unwrap();
        let cancelled = manager.cancel(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        // Running a cancelled job is a no-op.
        let plan = WorkflowPlan::new(vec![step("a")]).unwrap();
        let after = manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_racing_run_start_still_cancels() {
        /// Holds the processing-status write open so a cancel can land
        /// between the run's status read and that write.
        struct GatedStore {
            inner: MemoryJobStore,
            entered: tokio::sync::Notify,
            release: tokio::sync::Notify,
            armed: AtomicBool,
        }

        #[async_trait]
        impl JobStore for GatedStore {
            async fn create(&self, job: &Job) -> ScraporResult<()> {
                self.inner.create(job).await
            }
            async fn get(&self, id: Uuid) -> ScraporResult<Option<Job>> {
                self.inner.get(id).await
            }
            async fn update(&self, job: &Job) -> ScraporResult<()> {
                if job.status == JobStatus::Processing && self.armed.swap(false, Ordering::SeqCst)
                {
                    self.entered.notify_one();
                    self.release.notified().await;
                }
                self.inner.update(job).await
            }
            async fn list(&self, skip: usize, limit: usize) -> ScraporResult<(Vec<Job>, usize)> {
                self.inner.list(skip, limit).await
            }
        }

        let store = Arc::new(GatedStore {
            inner: MemoryJobStore::new(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
            armed: AtomicBool::new(true),
        });
        let exec = ScriptedExecutor::new(vec![("a", Ok(serde_json::json!(1)))]);
        let manager = Arc::new(JobManager::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            WorkflowRunner::new(exec),
            0.1,
        ));

        let job = manager
            .submit("https://example.com", Strategy::DiscoveryOnly)
            .await
            .unwrap();
        let plan = WorkflowPlan::new(vec![step("a")]).unwrap();

        let running = Arc::clone(&manager);
        let id = job.id;
        let run = tokio::spawn(async move {
            running.run(id, &plan, ExecutionMode::Sequential).await
        });

        // The run has read the pending job and is persisting the
        // processing transition; cancel lands in that window.
        store.entered.notified().await;
        let cancelled = manager.cancel(id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        store.release.notify_one();

        let done = run.await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Cancelled);
        assert!(done.results.is_empty());
    }

    #[tokio::test]
    async fn test_status_unknown_job_is_not_found() {
        let exec = ScriptedExecutor::new(vec![]);
        let (manager, _) = manager(exec);
        let err = manager.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ScraporError::Job(_)));
    }

    #[tokio::test]
    async fn test_store_failure_fails_job_with_persistence_error() {
        /// Accepts the initial create, then fails every write.
        struct BrokenStore {
            inner: MemoryJobStore,
            writes: AtomicUsize,
        }

        #[async_trait]
        impl JobStore for BrokenStore {
            async fn create(&self, job: &Job) -> ScraporResult<()> {
                self.inner.create(job).await
            }
            async fn get(&self, id: Uuid) -> ScraporResult<Option<Job>> {
                self.inner.get(id).await
            }
            async fn update(&self, _job: &Job) -> ScraporResult<()> {
                self.writes.fetch_add(1, Ordering::SeqCst);
                Err(ScraporError::Store("disk full".to_string()))
            }
            async fn list(&self, skip: usize, limit: usize) -> ScraporResult<(Vec<Job>, usize)> {
                self.inner.list(skip, limit).await
            }
        }

        let store = Arc::new(BrokenStore {
            inner: MemoryJobStore::new(),
            writes: AtomicUsize::new(0),
        });
        let exec = ScriptedExecutor::new(vec![("a", Ok(serde_json::json!(1)))]);
        let manager = JobManager::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            WorkflowRunner::new(exec),
            0.1,
        );

        let job = manager
            .submit("https://example.com", Strategy::DiscoveryOnly)
            .await
            .unwrap();
        let plan = WorkflowPlan::new(vec![step("a")]).unwrap();
        let done = manager
            .run(job.id, &plan, ExecutionMode::Sequential)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done
            .error
            .as_deref()
            .unwrap()
            .contains("persistence error"));
        // The final write is retried once before giving up.
        assert!(store.writes.load(Ordering::SeqCst) >= 3);
    }
}
