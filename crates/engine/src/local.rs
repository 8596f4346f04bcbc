//! Host-process backend for development without a cluster.
//!
//! Pods are bookkeeping only: they are ready as soon as they are created, and
//! exec runs the command directly on the host. There is no isolation.

use std::{
    collections::HashMap,
    process::Stdio,
    sync::{Mutex, MutexGuard, PoisonError},
};

use {
    async_trait::async_trait,
    chrono::Utc,
    futures::FutureExt,
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::{debug, warn},
};

use crate::{
    cluster::{ClusterClient, DeleteMode, ExecRequest, ExecSession, PodPhase, PodSpec, PodStatus},
    error::ClusterError,
};

#[derive(Default)]
pub struct LocalCluster {
    pods: Mutex<HashMap<(String, String), PodStatus>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn pods(&self) -> MutexGuard<'_, HashMap<(String, String), PodStatus>> {
        self.pods.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, name: &str, namespace: &str) -> bool {
        self.pods()
            .contains_key(&(namespace.to_string(), name.to_string()))
    }
}

#[async_trait]
impl ClusterClient for LocalCluster {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn create_pod(&self, spec: &PodSpec) -> Result<PodStatus, ClusterError> {
        let key = (spec.namespace.clone(), spec.name.clone());
        let mut pods = self.pods();
        if pods.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "pod",
                name: spec.name.clone(),
            });
        }
        let status = PodStatus {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            phase: PodPhase::Running,
            ready: true,
            image: Some(spec.image.clone()),
            labels: spec.labels.clone(),
            created_at: Some(Utc::now()),
        };
        pods.insert(key, status.clone());
        debug!(pod = %spec.name, namespace = %spec.namespace, "local pod registered");
        Ok(status)
    }

    async fn delete_pod(
        &self,
        name: &str,
        namespace: &str,
        _mode: DeleteMode,
    ) -> Result<(), ClusterError> {
        self.pods()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ClusterError::pod_not_found(name))
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodStatus, ClusterError> {
        self.pods()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::pod_not_found(name))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodStatus>, ClusterError> {
        let mut pods: Vec<PodStatus> = self
            .pods()
            .values()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect();
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pods)
    }

    async fn pod_logs(&self, name: &str, namespace: &str) -> Result<String, ClusterError> {
        if self.contains(name, namespace) {
            Ok(String::new())
        } else {
            Err(ClusterError::pod_not_found(name))
        }
    }

    async fn exec(
        &self,
        name: &str,
        namespace: &str,
        request: ExecRequest,
    ) -> Result<ExecSession, ClusterError> {
        if !self.contains(name, namespace) {
            return Err(ClusterError::pod_not_found(name));
        }
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| ClusterError::Rejected("empty command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| ClusterError::Transport(format!("failed to start {program}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClusterError::Transport("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClusterError::Transport("stderr not captured".into()))?;

        if let (Some(bytes), Some(mut pipe)) = (request.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&bytes).await {
                    warn!(error = %e, "failed to write exec stdin");
                }
                let _ = pipe.shutdown().await;
            });
        }

        let completion = async move {
            let status = child.wait().await?;
            Ok(status.code().unwrap_or(-1))
        }
        .boxed();

        Ok(ExecSession::new(Box::new(stdout), Box::new(stderr), completion))
    }
}
