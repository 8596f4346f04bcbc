use std::{collections::BTreeMap, sync::Arc};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    futures::future::BoxFuture,
    sandboxed_config::{Backend, ClusterConfig},
    serde::{Deserialize, Serialize},
    serde_json::json,
    tokio::io::AsyncRead,
};

use crate::{error::ClusterError, kubectl::KubectlClient, local::LocalCluster};

/// Name of the single container in every sandbox pod.
pub const CONTAINER_NAME: &str = "sandbox";

/// Lifecycle phase reported by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// The pod's containers have stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Running => f.write_str("Running"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed => f.write_str("Failed"),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Observed state of a pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodStatus {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    /// The pod's `Ready` condition is `True`.
    pub ready: bool,
    pub image: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Desired pod submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    /// Entry process of the container.
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl PodSpec {
    /// `v1/Pod` manifest with restart policy `Never`.
    pub fn to_manifest(&self) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "labels": self.labels,
            },
            "spec": {
                "restartPolicy": "Never",
                "containers": [{
                    "name": CONTAINER_NAME,
                    "image": self.image,
                    "command": self.command,
                }],
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Default grace period.
    Graceful,
    /// Zero grace period with foreground cascading deletion.
    Force,
}

/// A command to run inside a pod's container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub container: Option<String>,
    /// Allocate a TTY; the remote merges stderr into stdout.
    pub tty: bool,
}

impl ExecRequest {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: &str) -> Self {
        Self::new(vec!["sh".into(), "-c".into(), script.into()])
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn with_stdin(mut self, stdin: Vec<u8>) -> Self {
        self.stdin = Some(stdin);
        self
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A running remote command: its output channels plus a future that resolves
/// to the remote exit code once the command finishes.
pub struct ExecSession {
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
    pub completion: BoxFuture<'static, Result<i32, ClusterError>>,
}

impl ExecSession {
    pub fn new(
        stdout: BoxedReader,
        stderr: BoxedReader,
        completion: BoxFuture<'static, Result<i32, ClusterError>>,
    ) -> Self {
        Self {
            stdout,
            stderr,
            completion,
        }
    }
}

impl std::fmt::Debug for ExecSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession").finish_non_exhaustive()
    }
}

/// Access to the container orchestration API.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Human-readable backend name (e.g. "kubectl", "local").
    fn backend_name(&self) -> &'static str;

    async fn create_pod(&self, spec: &PodSpec) -> Result<PodStatus, ClusterError>;

    /// Fails with [`ClusterError::NotFound`] when the pod does not exist.
    async fn delete_pod(
        &self,
        name: &str,
        namespace: &str,
        mode: DeleteMode,
    ) -> Result<(), ClusterError>;

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodStatus, ClusterError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodStatus>, ClusterError>;

    async fn pod_logs(&self, name: &str, namespace: &str) -> Result<String, ClusterError>;

    /// Start a command in the pod. Output is read from the returned session.
    async fn exec(
        &self,
        name: &str,
        namespace: &str,
        request: ExecRequest,
    ) -> Result<ExecSession, ClusterError>;
}

/// Create the cluster backend selected by config.
///
/// `auto` resolves to `kubectl` only and fails when the binary does not run.
/// The local backend executes commands directly on the host and must be
/// selected explicitly.
pub async fn create_cluster_client(
    config: &ClusterConfig,
) -> Result<Arc<dyn ClusterClient>, ClusterError> {
    match config.backend {
        Backend::Kubectl => Ok(Arc::new(KubectlClient::new(config.clone()))),
        Backend::Local => {
            tracing::warn!(
                "local backend selected: sandboxes run commands directly on this host with no isolation"
            );
            Ok(Arc::new(LocalCluster::new()))
        },
        Backend::Auto => {
            if !is_kubectl_available(&config.kubectl).await {
                return Err(ClusterError::Unavailable(format!(
                    "`{} version --client` failed; install kubectl or set cluster.kubectl, \
                     or select the local backend explicitly",
                    config.kubectl
                )));
            }
            tracing::info!(kubectl = %config.kubectl, "cluster backend: kubectl");
            Ok(Arc::new(KubectlClient::new(config.clone())))
        },
    }
}

async fn is_kubectl_available(binary: &str) -> bool {
    tokio::process::Command::new(binary)
        .args(["version", "--client"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok_and(|s| s.success())
}
