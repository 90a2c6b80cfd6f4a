//! Scrapor command line: serve the gateway or probe agent health.

use clap::{Parser, Subcommand};
use scrapor_client::{AgentClients, AgentEndpoints, HealthAggregator};
use scrapor_gateway::{AppState, GatewayServer};
use scrapor_job::{FileJobStore, JobManager, JobStore, MemoryJobStore};
use scrapor_workflow::{AgentStepExecutor, WorkflowRunner};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scrapor", about = "Scrapor — scraping pipeline orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scrapor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Probe every downstream agent once and print the snapshot
    Health,
}

#[derive(Deserialize, Default)]
struct ScraporConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    agents: AgentEndpoints,
    #[serde(default)]
    pipeline: PipelineConfig,
    #[serde(default)]
    store: StoreConfig,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize)]
struct PipelineConfig {
    #[serde(default = "default_call_timeout")]
    call_timeout_secs: u64,
    #[serde(default = "default_health_timeout")]
    health_timeout_secs: u64,
    #[serde(default = "default_max_parallel")]
    max_parallel_steps: usize,
    #[serde(default = "default_initial_progress")]
    initial_progress: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            health_timeout_secs: default_health_timeout(),
            max_parallel_steps: default_max_parallel(),
            initial_progress: default_initial_progress(),
        }
    }
}

#[derive(Deserialize)]
struct StoreConfig {
    #[serde(default)]
    kind: StoreKind,
    #[serde(default = "default_store_path")]
    path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum StoreKind {
    #[default]
    Memory,
    File,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_call_timeout() -> u64 {
    60
}
fn default_health_timeout() -> u64 {
    5
}
fn default_max_parallel() -> usize {
    5
}
fn default_initial_progress() -> f64 {
    0.1
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/jobs")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // A missing config file falls back to defaults; a broken one is an error.
    let config: ScraporConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(raw) => toml::from_str(&raw).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", cli.config.display(), e)
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %cli.config.display(), "No config file, using defaults");
            ScraporConfig::default()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                cli.config.display(),
                e
            ));
        }
    };

    let clients = AgentClients::new(
        &config.agents,
        Duration::from_secs(config.pipeline.call_timeout_secs),
    )?;
    let health_timeout = Duration::from_secs(config.pipeline.health_timeout_secs);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let store: Arc<dyn JobStore> = match config.store.kind {
                StoreKind::Memory => Arc::new(MemoryJobStore::new()),
                StoreKind::File => Arc::new(FileJobStore::new(config.store.path.clone()).await?),
            };

            let runner = WorkflowRunner::new(Arc::new(AgentStepExecutor::new(clients.clone())));
            let manager = Arc::new(JobManager::new(
                store,
                runner,
                config.pipeline.initial_progress,
            ));
            let health = HealthAggregator::new(clients, health_timeout);
            let state = Arc::new(AppState {
                manager,
                health,
                max_fanout: config.pipeline.max_parallel_steps,
            });
            let app = GatewayServer::build(state);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Scrapor gateway listening on {}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Health => {
            let aggregator = HealthAggregator::new(clients, health_timeout);
            let records = aggregator.check_all().await;
            let overall = HealthAggregator::overall(&records);
            let snapshot = serde_json::json!({
                "status": overall,
                "agents": records.values().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
