use scrapor_core::{ScraporError, ScraporResult, StepKind, Strategy, VisionTask, WorkflowStep};
use serde::Deserialize;

/// Per-job knobs that feed into the generated workflow steps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanOptions {
    /// Search query for discovery steps.
    #[serde(default)]
    pub query: Option<String>,
    /// Crawl depth for discovery steps.
    #[serde(default)]
    pub depth: Option<u32>,
    /// Whether discovery follows links.
    #[serde(default)]
    pub follow_links: bool,
    /// Wait condition for the render step.
    #[serde(default)]
    pub wait_for: Option<String>,
    /// CSS selector map for extraction.
    #[serde(default)]
    pub selectors: Option<serde_json::Map<String, serde_json::Value>>,
    /// Schema for structured extraction.
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
    /// Free-form extraction prompt.
    #[serde(default)]
    pub llm_prompt: Option<String>,
    /// Vision task for image analysis.
    #[serde(default)]
    pub vision_task: Option<VisionTask>,
    /// Question for VQA vision tasks.
    #[serde(default)]
    pub question: Option<String>,
}

/// A validated workflow: steps plus dependencies resolved to indices.
///
/// Validation happens once at submission time. `depends_on` must name a
/// strictly earlier step, so the graph is acyclic by construction and the
/// runner never re-parses names.
#[derive(Debug, Clone)]
pub struct WorkflowPlan {
    steps: Vec<WorkflowStep>,
    deps: Vec<Option<usize>>,
}

impl WorkflowPlan {
    /// Validate a list of steps into a plan.
    ///
    /// Rejects empty workflows, duplicate step names, and `depends_on`
    /// references that are unknown or do not point at an earlier step.
    pub fn new(steps: Vec<WorkflowStep>) -> ScraporResult<Self> {
        if steps.is_empty() {
            return Err(ScraporError::Workflow("workflow has no steps".to_string()));
        }

        let mut deps = Vec::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            if steps[..idx].iter().any(|s| s.name == step.name) {
                return Err(ScraporError::Workflow(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            let dep = match &step.depends_on {
                None => None,
                Some(name) => {
                    let pos = steps[..idx].iter().position(|s| &s.name == name);
                    match pos {
                        Some(p) => Some(p),
                        None => {
                            return Err(ScraporError::Workflow(format!(
                                "step '{}' depends on '{}', which is not an earlier step",
                                step.name, name
                            )))
                        }
                    }
                }
            };
            deps.push(dep);
        }

        Ok(Self { steps, deps })
    }

    /// Build the canonical plan for a strategy.
    pub fn for_strategy(strategy: Strategy, opts: &PlanOptions) -> Self {
        let discover = || {
            WorkflowStep::new(
                "discover",
                StepKind::Discover {
                    query: opts.query.clone(),
                    depth: opts.depth.unwrap_or(1),
                    follow_links: opts.follow_links,
                },
            )
        };
        let render = || {
            WorkflowStep::new(
                "render",
                StepKind::Render {
                    wait_for: opts.wait_for.clone(),
                },
            )
        };
        let extract = || {
            WorkflowStep::new(
                "extract",
                StepKind::Extract {
                    selectors: opts.selectors.clone(),
                    schema: opts.schema.clone(),
                    llm_prompt: opts.llm_prompt.clone(),
                },
            )
            .depends_on("render")
        };
        let analyze = || {
            WorkflowStep::new(
                "analyze",
                StepKind::AnalyzeImage {
                    task: opts.vision_task.unwrap_or_default(),
                    question: opts.question.clone(),
                },
            )
            .depends_on("render")
        };

        let steps = match strategy {
            Strategy::DiscoveryOnly => vec![discover()],
            Strategy::ExtractionOnly => vec![render(), extract()],
            Strategy::VisionOnly => vec![render(), analyze()],
            Strategy::FullPipeline => {
                // Visual analysis is best-effort in the full pipeline;
                // extraction still runs when it fails.
                vec![discover(), render(), analyze().continue_on_error(), extract()]
            }
        };

        // Template steps always reference an earlier step.
        #[allow(clippy::expect_used)]
        Self::new(steps).expect("strategy templates are valid by construction")
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan is empty (never true for a validated plan).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The steps in declaration order.
    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    /// The resolved dependency index of one step, if any.
    pub fn dep_of(&self, idx: usize) -> Option<usize> {
        self.deps.get(idx).copied().flatten()
    }
}
