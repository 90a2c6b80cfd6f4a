//! Workflow planning and dependency-aware step execution.
//!
//! A [`WorkflowPlan`] is the validated, index-resolved form of a list of
//! [`WorkflowStep`]s — acyclic by construction, dependencies resolved to
//! indices at submission time. The [`WorkflowRunner`] executes a plan in
//! sequential or parallel mode against a [`StepExecutor`], which turns
//! every downstream failure into an error [`StepResult`] instead of
//! raising.
//!
//! [`WorkflowStep`]: scrapor_core::WorkflowStep
//! [`StepResult`]: scrapor_core::StepResult

/// Step execution against the downstream agents.
pub mod executor;
/// Validated workflow plans and strategy templates.
pub mod plan;
/// Sequential and bounded-parallel plan execution.
pub mod runner;

pub use executor::{AgentStepExecutor, StepExecutor, UPSTREAM_KEY};
pub use plan::{PlanOptions, WorkflowPlan};
pub use runner::{CancelFlag, ExecutionMode, NoopObserver, StepObserver, WorkflowRunner};
