//! Proxy Agent - Entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use proxy_agent::{Agent, AgentConfig, FailureMode, ShutdownSignal};
use proxy_agent_core::RuntimeBackend;
use proxy_agent_runtime::{Runtime, RuntimeKind};
use proxy_agent_telemetry::init_telemetry;
use tracing::info;

/// Node agent that starts, stops and probes sidecar proxies.
#[derive(Debug, Parser)]
#[command(name = "proxy-agent", version, about)]
#[command(after_help = "ENVIRONMENT VARIABLES:
    PROXY_AGENT_LISTEN_ADDR     Address to bind (default: 0.0.0.0)
    PROXY_AGENT_LISTEN_PORT     Port to listen on (default: 22222)
    PROXY_AGENT_FAILURE_MODE    fire_and_forget or report
    PROXY_AGENT_RUNTIME         docker or memory
    PROXY_AGENT_DOCKER_SOCKET   Docker socket path
    PROXY_AGENT_LOG_LEVEL       Log filter directive (RUST_LOG wins if set)
    PROXY_AGENT_METRICS_PORT    Prometheus metrics port (default: 9090)")]
struct Args {
    /// Path to configuration file (TOML or JSON).
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Runtime backend.
    #[arg(long, value_name = "docker|memory")]
    runtime: Option<RuntimeKind>,

    /// Port to listen on.
    #[arg(long, value_name = "PORT")]
    listen_port: Option<u16>,

    /// How failures are surfaced to callers.
    #[arg(long, value_name = "fire_and_forget|report")]
    failure_mode: Option<FailureMode>,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => AgentConfig::default(),
        }
        .with_env_overrides();

        if let Some(kind) = self.runtime {
            config.runtime.kind = kind;
        }
        if let Some(port) = self.listen_port {
            config.agent.listen_port = port;
        }
        if let Some(mode) = self.failure_mode {
            config.agent.failure_mode = mode;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = args.load_config()?;

    init_telemetry(&config.telemetry_config()).context("failed to initialize telemetry")?;
    config.validate().context("invalid configuration")?;

    info!(
        version = proxy_agent::VERSION,
        config = ?args.config,
        runtime = %config.runtime.kind,
        "Starting proxy agent"
    );

    let proxy = Arc::new(config.proxy.clone());
    let runtime = Runtime::connect(&config.runtime, Arc::clone(&proxy))
        .await
        .context("failed to initialize runtime backend")?;
    info!(
        runtime = runtime.name(),
        image = proxy.image(),
        status_port = ?proxy.status_port(),
        "Runtime backend ready"
    );

    let runtime: Arc<dyn RuntimeBackend> = Arc::new(runtime);
    Agent::new(runtime, config.agent.clone())
        .run(ShutdownSignal::with_os_signals())
        .await?;

    info!("Proxy agent stopped");
    Ok(())
}
