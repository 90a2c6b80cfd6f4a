use crate::agent::AgentClients;
use chrono::Utc;
use scrapor_core::{AgentKind, HealthRecord, OverallHealth};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

/// Polls every configured agent's health endpoint and reduces the
/// individual snapshots into one aggregate status.
///
/// Probes run in parallel and independently of any job; records are
/// point-in-time only and never persisted.
pub struct HealthAggregator {
    clients: AgentClients,
    timeout: Duration,
}

impl HealthAggregator {
    /// Default probe timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Build an aggregator over the given clients.
    pub fn new(clients: AgentClients, timeout: Duration) -> Self {
        Self { clients, timeout }
    }

    /// Probe all agents concurrently and return one record per agent.
    pub async fn check_all(&self) -> BTreeMap<AgentKind, HealthRecord> {
        let probes = self.clients.iter().map(|client| async {
            let start = Instant::now();
            let reachable = client.health(self.timeout).await;
            HealthRecord {
                agent: client.kind(),
                reachable,
                latency_ms: start.elapsed().as_millis() as u64,
                checked_at: Utc::now(),
            }
        });

        let records = futures_util::future::join_all(probes).await;
        let unreachable = records.iter().filter(|r| !r.reachable).count();
        info!(
            agents = records.len(),
            unreachable, "Health check complete"
        );

        records.into_iter().map(|r| (r.agent, r)).collect()
    }

    /// Reduce a set of records into the aggregate status: healthy iff
    /// every agent is reachable, degraded otherwise.
    pub fn overall(records: &BTreeMap<AgentKind, HealthRecord>) -> OverallHealth {
        if records.values().all(|r| r.reachable) {
            OverallHealth::Healthy
        } else {
            OverallHealth::Degraded
        }
    }
}
