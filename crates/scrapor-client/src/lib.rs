//! HTTP clients for the downstream pipeline agents.
//!
//! One [`AgentClient`] per agent wraps `POST /<verb>` with a bounded
//! timeout and a typed success/failure result; [`HealthAggregator`] polls
//! every agent's `GET /health` in parallel and reduces the snapshots into
//! an overall status.

/// Per-agent HTTP client and endpoint configuration.
pub mod agent;
/// Parallel health polling and aggregation.
pub mod health;

pub use agent::{AgentClient, AgentClients, AgentEndpoints};
pub use health::HealthAggregator;
