use async_trait::async_trait;
use scrapor_client::AgentClients;
use scrapor_core::{StepKind, StepResult, WorkflowStep};
use std::time::Instant;
use tracing::{debug, warn};

/// Reserved key under which a step's dependency output is injected into
/// its request body.
pub const UPSTREAM_KEY: &str = "upstream";

/// Runs one workflow step and normalizes its outcome.
///
/// The contract is infallible: network errors, timeouts, non-2xx
/// responses, and malformed payloads are all captured as an error
/// [`StepResult`], never raised.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute `step` against its agent. `upstream` is the resolved
    /// dependency output (`Some(Value::Null)` when a failed dependency
    /// was absorbed by `continue_on_error`).
    async fn execute(
        &self,
        target: &str,
        step: &WorkflowStep,
        upstream: Option<&serde_json::Value>,
    ) -> StepResult;
}

/// The production executor: dispatches each step kind to its agent
/// client over HTTP.
pub struct AgentStepExecutor {
    clients: AgentClients,
}

impl AgentStepExecutor {
    /// Build an executor over the given agent clients.
    pub fn new(clients: AgentClients) -> Self {
        Self { clients }
    }

    fn build_body(
        target: &str,
        step: &WorkflowStep,
        upstream: Option<&serde_json::Value>,
    ) -> serde_json::Value {
        let mut body = match &step.kind {
            StepKind::Discover {
                query,
                depth,
                follow_links,
            } => serde_json::json!({
                "url": target,
                "query": query,
                "depth": depth,
                "follow_links": follow_links,
            }),
            StepKind::Render { wait_for } => serde_json::json!({
                "url": target,
                "wait_for": wait_for.as_deref().unwrap_or("networkidle"),
            }),
            StepKind::Extract {
                selectors,
                schema,
                llm_prompt,
            } => serde_json::json!({
                "url": target,
                "selectors": selectors,
                "schema": schema,
                "llm_prompt": llm_prompt,
            }),
            StepKind::AnalyzeImage { task, question } => serde_json::json!({
                "url": target,
                "task": task,
                "question": question,
            }),
        };
        if let (Some(up), Some(obj)) = (upstream, body.as_object_mut()) {
            obj.insert(UPSTREAM_KEY.to_string(), up.clone());
        }
        body
    }
}

#[async_trait]
impl StepExecutor for AgentStepExecutor {
    async fn execute(
        &self,
        target: &str,
        step: &WorkflowStep,
        upstream: Option<&serde_json::Value>,
    ) -> StepResult {
        let agent = step.kind.agent();
        let body = Self::build_body(target, step, upstream);
        let start = Instant::now();

        debug!(step = %step.name, agent = %agent, "Executing step");
        let outcome = self.clients.get(agent).call(&body).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(payload) => {
                debug!(step = %step.name, duration_ms, "Step succeeded");
                StepResult::success(&step.name, payload, duration_ms)
            }
            Err(e) => {
                warn!(step = %step.name, duration_ms, error = %e, "Step failed");
                StepResult::error(&step.name, e.to_string(), duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapor_core::VisionTask;

    #[test]
    fn test_body_carries_typed_inputs() {
        let step = WorkflowStep::new(
            "discover",
            StepKind::Discover {
                query: Some("news".to_string()),
                depth: 2,
                follow_links: true,
            },
        );
        let body = AgentStepExecutor::build_body("https://example.com", &step, None);
        assert_eq!(body["url"], "https://example.com");
        assert_eq!(body["query"], "news");
        assert_eq!(body["depth"], 2);
        assert_eq!(body["follow_links"], true);
        assert!(body.get(UPSTREAM_KEY).is_none());
    }

    #[test]
    fn test_render_defaults_wait_for() {
        let step = WorkflowStep::new("render", StepKind::Render { wait_for: None });
        let body = AgentStepExecutor::build_body("https://example.com", &step, None);
        assert_eq!(body["wait_for"], "networkidle");
    }

    #[test]
    fn test_upstream_injected_under_reserved_key() {
        let step = WorkflowStep::new(
            "analyze",
            StepKind::AnalyzeImage {
                task: VisionTask::Ocr,
                question: None,
            },
        )
        .depends_on("render");
        let upstream = serde_json::json!({"screenshot": "abc"});
        let body = AgentStepExecutor::build_body("https://example.com", &step, Some(&upstream));
        assert_eq!(body[UPSTREAM_KEY]["screenshot"], "abc");
        assert_eq!(body["task"], "ocr");
    }

    #[test]
    fn test_null_upstream_still_injected() {
        // A failed dependency absorbed by continue_on_error substitutes null.
        let step = WorkflowStep::new(
            "extract",
            StepKind::Extract {
                selectors: None,
                schema: None,
                llm_prompt: None,
            },
        );
        let body = AgentStepExecutor::build_body(
            "https://example.com",
            &step,
            Some(&serde_json::Value::Null),
        );
        assert!(body.as_object().unwrap().contains_key(UPSTREAM_KEY));
        assert!(body[UPSTREAM_KEY].is_null());
    }
}
