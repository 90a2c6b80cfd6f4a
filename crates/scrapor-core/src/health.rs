use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The downstream agents this pipeline orchestrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Link/site crawling and search.
    Discovery,
    /// Browser rendering (page load, screenshot, script execution).
    Camoufox,
    /// OCR/VQA/description via a vision-language model.
    Vision,
    /// Selector- and LLM-based structured extraction.
    Extraction,
}

impl AgentKind {
    /// All agents, in the order they are reported.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Discovery,
        AgentKind::Camoufox,
        AgentKind::Vision,
        AgentKind::Extraction,
    ];

    /// The verb path this agent exposes for its single operation.
    pub fn verb_path(&self) -> &'static str {
        match self {
            AgentKind::Discovery => "/discover",
            AgentKind::Camoufox => "/render",
            AgentKind::Vision => "/analyze",
            AgentKind::Extraction => "/extract",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Discovery => write!(f, "discovery"),
            AgentKind::Camoufox => write!(f, "camoufox"),
            AgentKind::Vision => write!(f, "vision"),
            AgentKind::Extraction => write!(f, "extraction"),
        }
    }
}

/// Point-in-time health snapshot for one agent. Recomputed on every
/// health query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Which agent was probed.
    pub agent: AgentKind,
    /// Whether `GET /health` answered 200 within the timeout.
    pub reachable: bool,
    /// Round-trip latency of the probe.
    pub latency_ms: u64,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

/// Aggregate health exposed by the gateway.
///
/// Individual unreachability is surfaced per-agent; the aggregate never
/// escalates to "the whole system is down".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    /// All configured agents are reachable.
    Healthy,
    /// At least one agent is unreachable but the gateway itself is up.
    Degraded,
}
