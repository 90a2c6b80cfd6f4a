//! Core types and error definitions for the Scrapor pipeline.
//!
//! This crate provides the foundational types shared across all Scrapor
//! crates: the unified error enum, the [`Job`] entity and its lifecycle
//! states, the declarative [`WorkflowStep`] / [`StepResult`] pair, and the
//! per-agent health snapshot types.
//!
//! # Main types
//!
//! - [`ScraporError`] — Unified error enum for all Scrapor subsystems.
//! - [`ScraporResult`] — Convenience alias for `Result<T, ScraporError>`.
//! - [`Job`] / [`JobStatus`] / [`Strategy`] — One orchestrated request.
//! - [`WorkflowStep`] / [`StepKind`] — The declarative plan of agent calls.
//! - [`StepResult`] — Normalized outcome of running one step.
//! - [`AgentKind`] / [`HealthRecord`] — Downstream agents and their health.

/// Downstream agent identities and health snapshot types.
pub mod health;
/// The job entity, its status machine, and pipeline strategies.
pub mod job;
/// Declarative workflow steps and normalized step results.
pub mod workflow;

pub use health::{AgentKind, HealthRecord, OverallHealth};
pub use job::{Job, JobStatus, Strategy};
pub use workflow::{StepKind, StepResult, StepStatus, VisionTask, WorkflowStep};

/// Top-level error type for the Scrapor pipeline.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum ScraporError {
    /// An error from the API gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A failed call to a downstream agent (network, timeout, non-2xx).
    #[error("Agent error: {0}")]
    Agent(String),

    /// An invalid workflow plan (duplicate names, bad dependency reference).
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// A job lifecycle error (unknown id, illegal transition).
    #[error("Job error: {0}")]
    Job(String),

    /// A job store read or write failure.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// A convenience `Result` alias using [`ScraporError`].
pub type ScraporResult<T> = Result<T, ScraporError>;
