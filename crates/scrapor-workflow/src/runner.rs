use crate::executor::StepExecutor;
use crate::plan::WorkflowPlan;
use async_trait::async_trait;
use scrapor_core::{StepResult, StepStatus, WorkflowStep};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Cooperative cancellation flag, checked before each dispatch.
/// In-flight agent calls are allowed to finish.
pub type CancelFlag = Arc<AtomicBool>;

/// How the runner schedules independent steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Strictly in declared order, one step at a time.
    Sequential,
    /// Independent steps fan out concurrently, bounded by `max_fanout`.
    Parallel {
        /// Maximum number of concurrently dispatched steps.
        max_fanout: usize,
    },
}

/// Receives each executed step's result as soon as it resolves, before
/// the runner dispatches further work (publish-as-you-go). Skipped
/// steps are not reported.
#[async_trait]
pub trait StepObserver: Send + Sync {
    /// Called once per executed or synthesized step result.
    async fn on_step(&self, result: &StepResult);
}

/// An observer that does nothing.
pub struct NoopObserver;

#[async_trait]
impl StepObserver for NoopObserver {
    async fn on_step(&self, _result: &StepResult) {}
}

/// How a step's dependency resolution turned out.
enum Resolution {
    /// Execute, substituting the given upstream value (if any).
    Run(Option<serde_json::Value>),
    /// Do not execute; this synthesized result stands in.
    Synthesize(StepResult),
    /// The run stopped before this step could start.
    Skip,
}

fn resolve(step: &WorkflowStep, dep: &StepResult) -> Resolution {
    match dep.status {
        StepStatus::Success => Resolution::Run(Some(
            dep.output.clone().unwrap_or(serde_json::Value::Null),
        )),
        StepStatus::Skipped => Resolution::Skip,
        StepStatus::Error => {
            if step.continue_on_error {
                // Absorbed failure upstream: execute with a null substitute.
                Resolution::Run(Some(serde_json::Value::Null))
            } else {
                Resolution::Synthesize(StepResult::error(
                    &step.name,
                    format!("missing dependency '{}'", dep.step_name),
                    0,
                ))
            }
        }
    }
}

/// Executes a [`WorkflowPlan`] against a [`StepExecutor`], honoring
/// dependencies, `continue_on_error`, cancellation, and the early-stop
/// rule. Returns one result per step, in declaration order.
pub struct WorkflowRunner {
    executor: Arc<dyn StepExecutor>,
}

impl WorkflowRunner {
    /// Build a runner over the given executor.
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }

    /// Run the plan to completion. Never fails: every step ends as
    /// success, error, or skipped.
    pub async fn run(
        &self,
        target: &str,
        plan: &WorkflowPlan,
        mode: ExecutionMode,
        cancel: &CancelFlag,
        observer: Arc<dyn StepObserver>,
    ) -> Vec<StepResult> {
        info!(steps = plan.len(), ?mode, "Running workflow");
        match mode {
            ExecutionMode::Sequential => {
                self.run_sequential(target, plan, cancel, observer).await
            }
            ExecutionMode::Parallel { max_fanout } => {
                self.run_parallel(target, plan, max_fanout, cancel, observer)
                    .await
            }
        }
    }

    async fn run_sequential(
        &self,
        target: &str,
        plan: &WorkflowPlan,
        cancel: &CancelFlag,
        observer: Arc<dyn StepObserver>,
    ) -> Vec<StepResult> {
        let mut results: Vec<StepResult> = Vec::with_capacity(plan.len());
        let mut stopped = false;

        for (idx, step) in plan.steps().iter().enumerate() {
            if stopped || cancel.load(Ordering::SeqCst) {
                results.push(StepResult::skipped(&step.name));
                continue;
            }

            let resolution = match plan.dep_of(idx) {
                None => Resolution::Run(None),
                Some(d) => resolve(step, &results[d]),
            };

            let result = match resolution {
                Resolution::Skip => {
                    results.push(StepResult::skipped(&step.name));
                    continue;
                }
                Resolution::Synthesize(r) => r,
                Resolution::Run(upstream) => {
                    self.executor.execute(target, step, upstream.as_ref()).await
                }
            };

            if result.status == StepStatus::Error && !step.continue_on_error {
                warn!(step = %step.name, "Hard step failure, stopping workflow");
                stopped = true;
            }

            // The observer persists before the next step is dispatched.
            observer.on_step(&result).await;
            results.push(result);
        }

        results
    }

    async fn run_parallel(
        &self,
        target: &str,
        plan: &WorkflowPlan,
        max_fanout: usize,
        cancel: &CancelFlag,
        observer: Arc<dyn StepObserver>,
    ) -> Vec<StepResult> {
        let n = plan.len();
        let semaphore = Arc::new(Semaphore::new(max_fanout.max(1)));
        let abort = Arc::new(AtomicBool::new(false));

        // One watch channel per step so dependents can await its result
        // without blocking independent steps.
        let channels: Vec<(watch::Sender<Option<StepResult>>, watch::Receiver<Option<StepResult>>)> =
            (0..n).map(|_| watch::channel(None)).collect();

        let mut tasks: JoinSet<(usize, StepResult)> = JoinSet::new();

        // Spawn in declaration order; the semaphore is FIFO, so ready
        // steps are dispatched in that same order.
        for (idx, step) in plan.steps().iter().enumerate() {
            let step = step.clone();
            let dep_rx = plan.dep_of(idx).map(|d| channels[d].1.clone());
            let tx = channels[idx].0.clone();
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let cancel = Arc::clone(cancel);
            let executor = Arc::clone(&self.executor);
            let observer = Arc::clone(&observer);
            let target = target.to_string();

            tasks.spawn(async move {
                let resolution = match dep_rx {
                    None => Resolution::Run(None),
                    Some(mut rx) => loop {
                        let resolved = rx.borrow().clone();
                        if let Some(dep_result) = resolved {
                            break resolve(&step, &dep_result);
                        }
                        if rx.changed().await.is_err() {
                            break Resolution::Skip;
                        }
                    },
                };

                let result = match resolution {
                    Resolution::Skip => StepResult::skipped(&step.name),
                    Resolution::Synthesize(r) => r,
                    Resolution::Run(upstream) => match semaphore.acquire().await {
                        Ok(_permit) => {
                            if abort.load(Ordering::SeqCst) || cancel.load(Ordering::SeqCst) {
                                StepResult::skipped(&step.name)
                            } else {
                                executor.execute(&target, &step, upstream.as_ref()).await
                            }
                        }
                        Err(_) => StepResult::skipped(&step.name),
                    },
                };

                if result.status == StepStatus::Error && !step.continue_on_error {
                    warn!(step = %step.name, "Hard step failure, no further dispatch");
                    abort.store(true, Ordering::SeqCst);
                }

                // Observer first: dependents must stay blocked until the
                // result has been published and persisted.
                if result.status != StepStatus::Skipped {
                    observer.on_step(&result).await;
                }
                let _ = tx.send(Some(result.clone()));
                (idx, result)
            });
        }

        // Completion order is unspecified; the merge restores
        // declaration order so results are stable across runs.
        let mut slots: Vec<Option<StepResult>> = vec![None; n];
        while let Some(joined) = tasks.join_next().await {
            if let Ok((idx, result)) = joined {
                slots[idx] = Some(result);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.unwrap_or_else(|| StepResult::skipped(&plan.steps()[idx].name))
            })
            .collect()
    }
}
