//! Docker backend.
//!
//! Each workload gets one proxy container named `<prefix><workload key>`.
//! The container joins the pod sandbox's network namespace when the request
//! names one, and its status port is recorded as a label so readiness probes
//! do not depend on the configuration that was current at start time.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerInspectResponse, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, InspectContainerOptions, RemoveContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use proxy_agent_core::{
    ProxyConfig, Readiness, ReadinessRequest, RuntimeBackend, RuntimeError, RuntimeResult,
    StartRequest, StopRequest, WorkloadLocks, WorkloadRef,
};
use tracing::{debug, info, warn};

use crate::settings::DockerSettings;

/// Label carrying the workload key.
pub const LABEL_WORKLOAD: &str = "proxy-agent.io/workload";
/// Label marking containers owned by the agent.
pub const LABEL_MANAGED_BY: &str = "proxy-agent.io/managed-by";
/// Label carrying the proxy status port.
pub const LABEL_STATUS_PORT: &str = "proxy-agent.io/status-port";
/// Label carrying the interception mode.
pub const LABEL_INTERCEPTION_MODE: &str = "proxy-agent.io/interception-mode";

const MANAGED_BY: &str = "proxy-agent";

/// Backend driving proxy containers through the Docker Engine API.
pub struct DockerRuntime {
    docker: Docker,
    http: reqwest::Client,
    defaults: Arc<ProxyConfig>,
    settings: DockerSettings,
    locks: WorkloadLocks,
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DockerRuntime {
    /// Connect to the Docker daemon and verify it answers.
    pub async fn connect(
        settings: &DockerSettings,
        defaults: Arc<ProxyConfig>,
    ) -> RuntimeResult<Self> {
        let docker = match settings.socket.as_deref() {
            Some(path) => {
                Docker::connect_with_socket(path, settings.timeout.as_secs(), API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults().map(|d| d.with_timeout(settings.timeout)),
        }
        .map_err(|e| RuntimeError::unavailable(format!("failed to connect to Docker: {e}")))?;

        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::unavailable(format!("Docker daemon not responding: {e}")))?;

        info!(socket = ?settings.socket, "Connected to Docker daemon");
        Self::with_client(docker, settings.clone(), defaults)
    }

    /// Wrap an existing client.
    pub fn with_client(
        docker: Docker,
        settings: DockerSettings,
        defaults: Arc<ProxyConfig>,
    ) -> RuntimeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.probe_timeout)
            .no_proxy()
            .build()
            .map_err(|e| RuntimeError::backend(format!("failed to build probe client: {e}")))?;

        Ok(Self {
            docker,
            http,
            defaults,
            settings,
            locks: WorkloadLocks::new(),
        })
    }

    /// Container name for a workload key.
    pub fn container_name(&self, key: &str) -> String {
        container_name(&self.settings.container_prefix, key)
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<Option<ContainerInspectResponse>> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(info)),
            Err(e) if status_of(&e) == Some(404) => Ok(None),
            Err(e) => Err(self.map_error("inspect", name, e)),
        }
    }

    async fn start_container(&self, name: &str) -> RuntimeResult<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            // Already started.
            Err(e) if status_of(&e) == Some(304) => Ok(()),
            Err(e) => Err(self.map_error("start", name, e)),
        }
    }

    async fn create_container(&self, name: &str, request: &StartRequest) -> RuntimeResult<()> {
        let config = self.defaults.resolve(request.proxy.as_ref());
        if config.image().trim().is_empty() {
            return Err(RuntimeError::invalid_spec("proxy image must not be empty"));
        }

        let body = container_body(&request.target, &config);
        let options = CreateContainerOptionsBuilder::new().name(name).build();

        self.docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| self.map_error("create", name, e))?;

        info!(container = name, image = config.image(), "Created proxy container");
        Ok(())
    }

    async fn probe(&self, pod_ip: &str, port: u16) -> Readiness {
        let Ok(ip) = pod_ip.parse::<IpAddr>() else {
            return Readiness::failed(RuntimeError::invalid_spec(format!(
                "pod IP is not an address: {pod_ip}"
            )));
        };

        probe_status_port(
            &self.http,
            SocketAddr::new(ip, port),
            &self.settings.status_path,
            self.settings.probe_timeout,
        )
        .await
    }

    fn map_error(&self, operation: &'static str, name: &str, error: BollardError) -> RuntimeError {
        match error {
            BollardError::DockerResponseServerError {
                status_code: 404, ..
            } => RuntimeError::not_found(name),
            BollardError::DockerResponseServerError {
                status_code: 409,
                message,
            } => RuntimeError::already_exists(name, message),
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::backend(format!(
                "docker {operation} {name} failed ({status_code}): {message}"
            )),
            BollardError::RequestTimeoutError => {
                RuntimeError::timeout(format!("docker {operation}"), self.settings.timeout)
            }
            other => RuntimeError::unavailable(format!("docker {operation} {name}: {other}")),
        }
    }

    /// Stop then force-remove the proxy container for `key`.
    async fn remove_proxy(&self, key: &str) -> RuntimeResult<()> {
        let name = self.container_name(key);

        let grace = i32::try_from(self.settings.stop_grace_period.as_secs()).unwrap_or(i32::MAX);
        match self
            .docker
            .stop_container(&name, Some(StopContainerOptionsBuilder::new().t(grace).build()))
            .await
        {
            Ok(()) => {}
            Err(e) if matches!(status_of(&e), Some(304 | 404)) => {
                debug!(container = %name, "Proxy container not running");
            }
            Err(e) => return Err(self.map_error("stop", &name, e)),
        }

        match self
            .docker
            .remove_container(
                &name,
                Some(RemoveContainerOptionsBuilder::new().force(true).build()),
            )
            .await
        {
            Ok(()) => {
                info!(workload = %key, container = %name, "Removed proxy container");
                Ok(())
            }
            Err(e) if status_of(&e) == Some(404) => Ok(()),
            Err(e) => Err(self.map_error("remove", &name, e)),
        }
    }
}

#[async_trait]
impl RuntimeBackend for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn start_proxy(&self, request: &StartRequest) -> RuntimeResult<()> {
        let key = request.target.key();
        let _guard = self.locks.acquire(&key).await;
        let name = self.container_name(&key);

        match self.inspect(&name).await? {
            Some(info) if is_running(&info) => {
                debug!(container = %name, "Proxy container already running");
                return Ok(());
            }
            Some(_) => {
                debug!(container = %name, "Restarting stopped proxy container");
            }
            None => self.create_container(&name, request).await?,
        }

        self.start_container(&name).await?;
        info!(workload = %key, container = %name, "Started proxy container");
        Ok(())
    }

    async fn stop_proxy(&self, request: &StopRequest) -> RuntimeResult<()> {
        let key = request.target.key();
        let _guard = self.locks.acquire(&key).await;
        self.remove_proxy(&key).await
    }

    async fn is_ready(&self, request: &ReadinessRequest) -> Readiness {
        let key = request.target.key();
        let _guard = self.locks.acquire(&key).await;
        let name = self.container_name(&key);

        let info = match self.inspect(&name).await {
            Ok(Some(info)) => info,
            Ok(None) => return Readiness::not_ready(),
            Err(e) => return Readiness::failed(e),
        };

        if !is_running(&info) {
            return Readiness::not_ready();
        }

        let (Some(pod_ip), Some(port)) = (request.target.pod_ip.as_deref(), status_port(&info))
        else {
            // Nothing to probe beyond the container state.
            return Readiness::ready();
        };

        self.probe(pod_ip, port).await
    }
}

/// Container name for a workload key under `prefix`.
///
/// Characters Docker rejects become `_`. Decoded requests only carry
/// DNS-1123 names, so the only such character in a key is the single `/`
/// between namespace and workload, and the mapping stays injective.
pub fn container_name(prefix: &str, key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}{sanitized}")
}

/// Create body for a proxy container.
pub fn container_body(target: &WorkloadRef, config: &ProxyConfig) -> ContainerCreateBody {
    let mut labels = HashMap::from([
        (LABEL_WORKLOAD.to_string(), target.key()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        (
            LABEL_INTERCEPTION_MODE.to_string(),
            config.interception_mode().to_string(),
        ),
    ]);
    if let Some(port) = config.status_port() {
        labels.insert(LABEL_STATUS_PORT.to_string(), port.to_string());
    }

    let mut env = vec![format!(
        "ISTIO_META_INTERCEPTION_MODE={}",
        config.interception_mode()
    )];
    if let Some(namespace) = target.namespace.as_deref() {
        env.push(format!("POD_NAMESPACE={namespace}"));
    }
    env.push(format!("POD_NAME={}", target.workload));
    if let Some(pod_ip) = target.pod_ip.as_deref() {
        env.push(format!("INSTANCE_IP={pod_ip}"));
    }

    ContainerCreateBody {
        image: Some(config.image().to_string()),
        cmd: Some(config.args().to_vec()),
        user: Some(config.run_as_user().to_string()),
        env: Some(env),
        labels: Some(labels),
        host_config: Some(HostConfig {
            network_mode: target
                .sandbox_id
                .as_deref()
                .map(|id| format!("container:{id}")),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

/// Probe `http://<addr><path>`; any 2xx answer means ready.
///
/// A refused connection is a clean "not ready" since the proxy may still be
/// booting. Timeouts and other transport errors are reported as failures.
pub async fn probe_status_port(
    client: &reqwest::Client,
    addr: SocketAddr,
    path: &str,
    timeout: Duration,
) -> Readiness {
    let url = format!("http://{addr}{path}");
    match client.get(&url).send().await {
        Ok(response) => {
            let ready = response.status().is_success();
            if !ready {
                debug!(%url, status = %response.status(), "Proxy status port not ready");
            }
            Readiness::from(ready)
        }
        Err(e) if e.is_timeout() => {
            warn!(%url, "Proxy status probe timed out");
            Readiness::failed(RuntimeError::timeout("status probe", timeout))
        }
        Err(e) if e.is_connect() => {
            debug!(%url, error = %e, "Proxy status port refused connection");
            Readiness::not_ready()
        }
        Err(e) => Readiness::failed(RuntimeError::unavailable(format!(
            "status probe {url}: {e}"
        ))),
    }
}

fn is_running(info: &ContainerInspectResponse) -> bool {
    info.state
        .as_ref()
        .and_then(|state| state.running)
        .unwrap_or(false)
}

fn status_port(info: &ContainerInspectResponse) -> Option<u16> {
    info.config
        .as_ref()?
        .labels
        .as_ref()?
        .get(LABEL_STATUS_PORT)?
        .parse()
        .ok()
}

fn status_of(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}
