use crate::routes;
use axum::routing::{get, post};
use axum::Router;
use scrapor_client::HealthAggregator;
use scrapor_job::JobManager;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    /// Drives job lifecycles.
    pub manager: Arc<JobManager>,
    /// Polls downstream agent health.
    pub health: HealthAggregator,
    /// Fan-out bound applied when a job requests parallel execution.
    pub max_fanout: usize,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway router over the given state.
    pub fn build(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/jobs", post(routes::submit_job).get(routes::list_jobs))
            .route("/jobs/{id}", get(routes::get_job))
            .route("/jobs/{id}/cancel", post(routes::cancel_job))
            .route("/health", get(routes::health))
            .with_state(state)
    }
}
