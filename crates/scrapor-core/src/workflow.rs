use crate::health::AgentKind;
use serde::{Deserialize, Serialize};

/// What the vision agent should do with a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisionTask {
    /// Extract visible text.
    Ocr,
    /// Answer a question about the image.
    Vqa,
    /// Free-form description of the page.
    #[default]
    Description,
    /// Classify the page content.
    Classification,
}

/// The closed set of step kinds, each carrying its own typed input.
///
/// Resolved via exhaustive matching; there is no string-tag dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepKind {
    /// Link/site discovery or search.
    Discover {
        /// Search query, when the target is a query rather than a URL.
        #[serde(default)]
        query: Option<String>,
        /// Crawl depth.
        #[serde(default = "default_depth")]
        depth: u32,
        /// Whether discovered links are followed.
        #[serde(default)]
        follow_links: bool,
    },
    /// Browser rendering: page load, screenshot, rendered HTML.
    Render {
        /// Wait condition before capturing (e.g. a CSS selector).
        #[serde(default)]
        wait_for: Option<String>,
    },
    /// Selector- and LLM-based structured extraction.
    Extract {
        /// CSS selector map, field name → selector.
        #[serde(default)]
        selectors: Option<serde_json::Map<String, serde_json::Value>>,
        /// Schema for structured extraction.
        #[serde(default)]
        schema: Option<serde_json::Value>,
        /// Free-form extraction prompt for the LLM path.
        #[serde(default)]
        llm_prompt: Option<String>,
    },
    /// Visual analysis of a rendered screenshot.
    AnalyzeImage {
        /// Which vision task to run.
        #[serde(default)]
        task: VisionTask,
        /// Question for VQA tasks.
        #[serde(default)]
        question: Option<String>,
    },
}

fn default_depth() -> u32 {
    1
}

impl StepKind {
    /// The downstream agent that serves this step kind.
    pub fn agent(&self) -> AgentKind {
        match self {
            StepKind::Discover { .. } => AgentKind::Discovery,
            StepKind::Render { .. } => AgentKind::Camoufox,
            StepKind::Extract { .. } => AgentKind::Extraction,
            StepKind::AnalyzeImage { .. } => AgentKind::Vision,
        }
    }
}

/// A declarative unit inside a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique name within the workflow; becomes the stage key in results.
    pub name: String,
    /// The kind of agent call, with its typed input.
    #[serde(flatten)]
    pub kind: StepKind,
    /// Name of an earlier step whose output this step consumes.
    #[serde(default)]
    pub depends_on: Option<String>,
    /// Absorb this step's failure instead of failing the whole job.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl WorkflowStep {
    /// Create a step with the given name and kind.
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: None,
            continue_on_error: false,
        }
    }

    /// Declare a dependency on an earlier step's output.
    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on = Some(step.into());
        self
    }

    /// Absorb this step's failure instead of failing the whole job.
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// Terminal status of one executed (or skipped) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The agent call returned a payload.
    Success,
    /// The agent call failed or a dependency was missing.
    Error,
    /// Never started because an earlier hard failure stopped the run.
    Skipped,
}

/// The normalized outcome of running one step. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Name of the step this result belongs to.
    pub step_name: String,
    /// Success, error, or skipped.
    pub status: StepStatus,
    /// Raw agent payload on success.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Failure description on error.
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock execution time.
    pub duration_ms: u64,
}

impl StepResult {
    /// A successful result carrying the agent's payload.
    pub fn success(
        step_name: impl Into<String>,
        output: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Success,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    /// A failed result carrying the failure description.
    pub fn error(step_name: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Error,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// A step that never started because the run stopped early.
    pub fn skipped(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Whether this result is a success.
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}
