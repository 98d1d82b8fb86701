use super::Orchestrator;
use crate::types::{NetworkAttachment, Task, TaskState};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::header::HOST;
use hyper::Request;
use hyper_util::rt::TokioIo;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;

/// Engine socket used when no host is given.
const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Bound on a single task listing so a wedged engine cannot stall a cycle.
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the Docker Engine API is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DockerHost {
    Unix(PathBuf),
    Http(String),
}

impl DockerHost {
    /// Accepts `unix://`, Docker-style `tcp://`, `http://` and `https://`.
    /// An empty host means the local engine socket.
    fn parse(docker_host: &str) -> Result<Self> {
        let host = docker_host.trim();
        if host.is_empty() {
            return Ok(DockerHost::Unix(PathBuf::from(DEFAULT_SOCKET)));
        }
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(anyhow!("Docker host {:?} names no socket", docker_host));
            }
            return Ok(DockerHost::Unix(PathBuf::from(path)));
        }
        let host = host.trim_end_matches('/');
        if let Some(rest) = host.strip_prefix("tcp://") {
            return Ok(DockerHost::Http(format!("http://{}", rest)));
        }
        if host.starts_with("http://") || host.starts_with("https://") {
            return Ok(DockerHost::Http(host.to_string()));
        }
        Err(anyhow!(
            "Unsupported Docker host {:?}: expected unix://, tcp://, http:// or https://",
            docker_host
        ))
    }
}

enum Transport {
    Unix(PathBuf),
    Http {
        client: reqwest::Client,
        base_url: String,
    },
}

/// Lists swarm tasks through the Docker Engine HTTP API.
///
/// The engine's task listing carries `NetworksAttachments`, which holds
/// the overlay addresses handed out to each replica.
pub struct SwarmOrchestrator {
    transport: Transport,
}

impl SwarmOrchestrator {
    pub fn new(docker_host: &str) -> Result<Self> {
        let transport = match DockerHost::parse(docker_host)? {
            DockerHost::Unix(socket) => Transport::Unix(socket),
            DockerHost::Http(base_url) => Transport::Http {
                client: reqwest::Client::builder()
                    .timeout(LIST_TIMEOUT)
                    .build()
                    .context("Failed to build Docker Engine client")?,
                base_url,
            },
        };
        Ok(Self { transport })
    }

    async fn get(&self, path_and_query: &str) -> Result<Bytes> {
        match &self.transport {
            Transport::Unix(socket) => {
                tokio::time::timeout(LIST_TIMEOUT, get_unix(socket, path_and_query))
                    .await
                    .map_err(|_| anyhow!("Docker Engine did not answer within {:?}", LIST_TIMEOUT))?
            }
            Transport::Http { client, base_url } => client
                .get(format!("{}{}", base_url, path_and_query))
                .send()
                .await
                .with_context(|| format!("Failed to reach Docker Engine at {}", base_url))?
                .error_for_status()
                .context("Docker Engine refused task listing")?
                .bytes()
                .await
                .context("Failed to read task listing"),
        }
    }
}

/// One HTTP/1.1 request over the engine's Unix socket.
async fn get_unix(socket: &Path, path_and_query: &str) -> Result<Bytes> {
    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("Failed to connect to Docker socket {}", socket.display()))?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("Docker socket connection closed: {}", e);
        }
    });

    let request = Request::get(path_and_query)
        .header(HOST, "docker")
        .body(Empty::<Bytes>::new())?;
    let response = sender.send_request(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    if !status.is_success() {
        return Err(anyhow!(
            "Docker Engine refused task listing: {} {}",
            status,
            String::from_utf8_lossy(&body).trim()
        ));
    }
    Ok(body)
}

/// `/tasks` with the running-desired and service filters applied.
fn tasks_path(services: &[String]) -> Result<String> {
    let filters = serde_json::json!({
        "desired-state": ["running"],
        "service": services,
    });
    let mut url = reqwest::Url::parse("http://docker/tasks")?;
    url.query_pairs_mut()
        .append_pair("filters", &filters.to_string());
    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

#[async_trait]
impl Orchestrator for SwarmOrchestrator {
    async fn running_tasks(&self, services: &[String]) -> Result<Vec<Task>> {
        let body = self.get(&tasks_path(services)?).await?;
        let tasks: Vec<WireTask> =
            serde_json::from_slice(&body).context("Failed to decode task listing")?;
        debug!("Docker Engine returned {} tasks", tasks.len());
        Ok(tasks.into_iter().map(Into::into).collect())
    }
}

#[derive(Deserialize)]
struct WireTask {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "DesiredState")]
    desired_state: Option<TaskState>,
    #[serde(rename = "Status")]
    status: Option<WireStatus>,
    #[serde(rename = "NetworksAttachments")]
    networks_attachments: Option<Vec<WireAttachment>>,
}

#[derive(Deserialize)]
struct WireStatus {
    #[serde(rename = "State")]
    state: Option<TaskState>,
}

#[derive(Deserialize)]
struct WireAttachment {
    #[serde(rename = "Network")]
    network: Option<WireNetwork>,
    #[serde(rename = "Addresses")]
    addresses: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct WireNetwork {
    #[serde(rename = "Spec")]
    spec: Option<WireNetworkSpec>,
}

#[derive(Deserialize)]
struct WireNetworkSpec {
    #[serde(rename = "Name")]
    name: Option<String>,
}

impl From<WireTask> for Task {
    fn from(t: WireTask) -> Self {
        Task {
            id: t.id,
            desired_state: t.desired_state.unwrap_or(TaskState::Unknown),
            state: t
                .status
                .and_then(|s| s.state)
                .unwrap_or(TaskState::Unknown),
            attachments: t
                .networks_attachments
                .unwrap_or_default()
                .into_iter()
                .map(|a| NetworkAttachment {
                    network: a
                        .network
                        .and_then(|n| n.spec)
                        .and_then(|s| s.name)
                        .unwrap_or_default(),
                    addresses: a.addresses.unwrap_or_default(),
                })
                .collect(),
        }
    }
}
