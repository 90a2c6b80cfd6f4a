use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created and persisted, not yet dispatched.
    Pending,
    /// The pipeline is running.
    Processing,
    /// All steps finished; `progress` is exactly 1.0.
    Completed,
    /// A hard step failure ended the pipeline; `error` is set.
    Failed,
    /// Cancelled by the caller before or during processing.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal (the job is read-only from here on).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which pipeline shape a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Only the discovery agent.
    DiscoveryOnly,
    /// Render the page, then structured extraction.
    ExtractionOnly,
    /// Render the page, then visual analysis of the screenshot.
    VisionOnly,
    /// Discovery, render, visual analysis, and extraction.
    FullPipeline,
}

impl std::str::FromStr for Strategy {
    type Err = crate::ScraporError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery-only" => Ok(Strategy::DiscoveryOnly),
            "extraction-only" => Ok(Strategy::ExtractionOnly),
            "vision-only" => Ok(Strategy::VisionOnly),
            "full-pipeline" => Ok(Strategy::FullPipeline),
            other => Err(crate::ScraporError::Gateway(format!(
                "unknown strategy '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::DiscoveryOnly => write!(f, "discovery-only"),
            Strategy::ExtractionOnly => write!(f, "extraction-only"),
            Strategy::VisionOnly => write!(f, "vision-only"),
            Strategy::FullPipeline => write!(f, "full-pipeline"),
        }
    }
}

/// One end-to-end orchestrated request tracked through its lifecycle.
///
/// Mutated exclusively by the job manager while running; read-only once
/// the status is terminal. `results` keeps stage outputs in execution
/// order and never loses an entry once written, so partial results
/// survive a later failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque unique identifier, assigned at creation.
    pub id: Uuid,
    /// Target URL or query string.
    pub target: String,
    /// Pipeline strategy this job runs.
    pub strategy: Strategy,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Fraction of the pipeline completed, in `[0.0, 1.0]`.
    pub progress: f64,
    /// Stage name → raw stage output, insertion order = execution order.
    #[serde(default)]
    pub results: serde_json::Map<String, serde_json::Value>,
    /// Failure description naming the first hard-failing step.
    #[serde(default)]
    pub error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Updated on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job for the given target and strategy.
    pub fn new(target: impl Into<String>, strategy: Strategy) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target: target.into(),
            strategy,
            status: JobStatus::Pending,
            progress: 0.0,
            results: serde_json::Map::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Transition `pending → processing`, signalling liveness with an
    /// initial progress fraction before any step has produced output.
    pub fn mark_processing(&mut self, initial_progress: f64) {
        self.status = JobStatus::Processing;
        self.progress = initial_progress.clamp(0.0, 1.0);
        self.touch();
    }

    /// Merge one stage's output and advance progress. Progress is
    /// monotone: a lower value than the current one is ignored.
    pub fn record_stage(
        &mut self,
        stage: impl Into<String>,
        output: serde_json::Value,
        progress: f64,
    ) {
        self.results.insert(stage.into(), output);
        if progress > self.progress {
            self.progress = progress.min(1.0);
        }
        self.touch();
    }

    /// Advance progress without recording output (failed step absorbed
    /// by `continue_on_error` still counts toward completion).
    pub fn advance_progress(&mut self, progress: f64) {
        if progress > self.progress {
            self.progress = progress.min(1.0);
        }
        self.touch();
    }

    /// Transition `processing → completed`; progress is forced to 1.0.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.touch();
    }

    /// Transition to `failed`, retaining accumulated results as-is.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    /// Transition to `cancelled` from pending or processing.
    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.touch();
    }
}
