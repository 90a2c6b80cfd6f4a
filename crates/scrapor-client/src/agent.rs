use scrapor_core::{AgentKind, ScraporError, ScraporResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Base URLs for every downstream agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEndpoints {
    /// Discovery agent base URL.
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,
    /// Camoufox (browser rendering) agent base URL.
    #[serde(default = "default_camoufox_url")]
    pub camoufox_url: String,
    /// Vision agent base URL.
    #[serde(default = "default_vision_url")]
    pub vision_url: String,
    /// Extraction agent base URL.
    #[serde(default = "default_extraction_url")]
    pub extraction_url: String,
}

fn default_discovery_url() -> String {
    "http://discovery-agent:8001".to_string()
}
fn default_camoufox_url() -> String {
    "http://camoufox-agent:8004".to_string()
}
fn default_vision_url() -> String {
    "http://vision-agent:8003".to_string()
}
fn default_extraction_url() -> String {
    "http://extraction-agent:8002".to_string()
}

impl Default for AgentEndpoints {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            camoufox_url: default_camoufox_url(),
            vision_url: default_vision_url(),
            extraction_url: default_extraction_url(),
        }
    }
}

impl AgentEndpoints {
    /// The base URL for one agent.
    pub fn url_for(&self, agent: AgentKind) -> &str {
        match agent {
            AgentKind::Discovery => &self.discovery_url,
            AgentKind::Camoufox => &self.camoufox_url,
            AgentKind::Vision => &self.vision_url,
            AgentKind::Extraction => &self.extraction_url,
        }
    }
}

/// Client for one downstream agent.
///
/// Every call runs under the configured timeout; a timeout, connect
/// failure, non-2xx status, or malformed payload all surface as
/// [`ScraporError::Agent`] — never a panic.
#[derive(Debug, Clone)]
pub struct AgentClient {
    kind: AgentKind,
    base_url: String,
    http: reqwest::Client,
}

impl AgentClient {
    /// Build a client for one agent with a bounded per-call timeout.
    pub fn new(
        kind: AgentKind,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> ScraporResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScraporError::Http(e.to_string()))?;
        Ok(Self {
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// The agent this client talks to.
    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// POST the agent's verb endpoint with a JSON body.
    ///
    /// `200` with a JSON payload succeeds; anything else is an agent
    /// failure carrying the status and a snippet of the response body.
    pub async fn call(&self, body: &serde_json::Value) -> ScraporResult<serde_json::Value> {
        let url = format!("{}{}", self.base_url, self.kind.verb_path());
        debug!(agent = %self.kind, url = %url, "Calling agent");

        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ScraporError::Agent(format!("{}: {}", self.kind, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            warn!(agent = %self.kind, status = %status, "Agent returned error status");
            return Err(ScraporError::Agent(format!(
                "{} returned {}: {}",
                self.kind, status, snippet
            )));
        }

        resp.json().await.map_err(|e| {
            ScraporError::Agent(format!("{} returned malformed payload: {}", self.kind, e))
        })
    }

    /// Probe `GET /health` under its own short timeout.
    ///
    /// Any non-200 status, timeout, or transport error counts as
    /// unreachable.
    pub async fn health(&self, timeout: Duration) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).timeout(timeout).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                warn!(agent = %self.kind, error = %e, "Health check failed");
                false
            }
        }
    }
}

/// The full set of agent clients, one per [`AgentKind`].
#[derive(Debug, Clone)]
pub struct AgentClients {
    discovery: AgentClient,
    camoufox: AgentClient,
    vision: AgentClient,
    extraction: AgentClient,
}

impl AgentClients {
    /// Build a client for every configured agent endpoint.
    pub fn new(endpoints: &AgentEndpoints, call_timeout: Duration) -> ScraporResult<Self> {
        Ok(Self {
            discovery: AgentClient::new(
                AgentKind::Discovery,
                &endpoints.discovery_url,
                call_timeout,
            )?,
            camoufox: AgentClient::new(AgentKind::Camoufox, &endpoints.camoufox_url, call_timeout)?,
            vision: AgentClient::new(AgentKind::Vision, &endpoints.vision_url, call_timeout)?,
            extraction: AgentClient::new(
                AgentKind::Extraction,
                &endpoints.extraction_url,
                call_timeout,
            )?,
        })
    }

    /// The client for one agent.
    pub fn get(&self, agent: AgentKind) -> &AgentClient {
        match agent {
            AgentKind::Discovery => &self.discovery,
            AgentKind::Camoufox => &self.camoufox,
            AgentKind::Vision => &self.vision,
            AgentKind::Extraction => &self.extraction,
        }
    }

    /// All clients, in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentClient> {
        AgentKind::ALL.iter().map(|k| self.get(*k))
    }
}
