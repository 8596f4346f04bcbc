//! Cluster backend that drives the `kubectl` binary.

use std::{collections::BTreeMap, process::Stdio};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    futures::FutureExt,
    sandboxed_config::ClusterConfig,
    serde::Deserialize,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::Command,
    },
    tracing::{debug, trace, warn},
};

use crate::{
    cluster::{ClusterClient, DeleteMode, ExecRequest, ExecSession, PodPhase, PodSpec, PodStatus},
    error::ClusterError,
};

/// Line kubectl prints on stderr when the remote command exits non-zero.
const EXIT_MARKER: &str = "command terminated with exit code ";

/// Capacity of the pipe that forwards remote stderr to the session.
const STDERR_PIPE_CAPACITY: usize = 64 * 1024;

pub struct KubectlClient {
    config: ClusterConfig,
}

impl KubectlClient {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref context) = self.config.context {
            args.extend(["--context".to_string(), context.clone()]);
        }
        if let Some(ref kubeconfig) = self.config.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig.clone()]);
        }
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.kubectl);
        cmd.args(self.base_args()).args(args).kill_on_drop(true);
        cmd
    }

    /// Run kubectl to completion. A non-zero exit becomes a classified error.
    async fn run(
        &self,
        args: Vec<String>,
        stdin: Option<Vec<u8>>,
        name: &str,
    ) -> Result<Vec<u8>, ClusterError> {
        trace!(kubectl = %self.config.kubectl, ?args, "running kubectl");
        let mut cmd = self.command(&args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn()?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(&bytes).await?;
            pipe.shutdown().await?;
        }
        let output = child.wait_with_output().await?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(?args, %stderr, "kubectl failed");
            Err(classify_failure(name, &stderr))
        }
    }
}

#[async_trait]
impl ClusterClient for KubectlClient {
    fn backend_name(&self) -> &'static str {
        "kubectl"
    }

    async fn create_pod(&self, spec: &PodSpec) -> Result<PodStatus, ClusterError> {
        let manifest = serde_json::to_vec(&spec.to_manifest())?;
        let out = self
            .run(create_args(&spec.namespace), Some(manifest), &spec.name)
            .await?;
        parse_pod(&out)
    }

    async fn delete_pod(
        &self,
        name: &str,
        namespace: &str,
        mode: DeleteMode,
    ) -> Result<(), ClusterError> {
        self.run(delete_args(name, namespace, mode), None, name)
            .await
            .map(|_| ())
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodStatus, ClusterError> {
        let args = vec![
            "get".into(),
            "pod".into(),
            name.into(),
            "-n".into(),
            namespace.into(),
            "-o".into(),
            "json".into(),
        ];
        let out = self.run(args, None, name).await?;
        parse_pod(&out)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodStatus>, ClusterError> {
        let args = vec![
            "get".into(),
            "pods".into(),
            "-n".into(),
            namespace.into(),
            "-o".into(),
            "json".into(),
        ];
        let out = self.run(args, None, namespace).await?;
        parse_pod_list(&out)
    }

    async fn pod_logs(&self, name: &str, namespace: &str) -> Result<String, ClusterError> {
        let args = vec!["logs".into(), name.into(), "-n".into(), namespace.into()];
        let out = self.run(args, None, name).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    async fn exec(
        &self,
        name: &str,
        namespace: &str,
        request: ExecRequest,
    ) -> Result<ExecSession, ClusterError> {
        let args = exec_args(name, namespace, &request);
        trace!(kubectl = %self.config.kubectl, ?args, "starting kubectl exec");

        let mut cmd = self.command(&args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClusterError::Transport("kubectl stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClusterError::Transport("kubectl stderr not captured".into()))?;

        if let (Some(bytes), Some(mut pipe)) = (request.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&bytes).await {
                    warn!(error = %e, "failed to write exec stdin");
                }
                let _ = pipe.shutdown().await;
            });
        }

        let (mut forward, session_stderr) = tokio::io::duplex(STDERR_PIPE_CAPACITY);
        let tee = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr);
            let mut line = Vec::new();
            let mut remote_exit = None;
            let mut forwarding = true;
            loop {
                line.clear();
                match lines.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {},
                    Err(e) => {
                        debug!(error = %e, "kubectl stderr read failed");
                        break;
                    },
                }
                if let Some(code) = parse_exit_marker(&String::from_utf8_lossy(&line)) {
                    remote_exit = Some(code);
                    continue;
                }
                // Keep draining kubectl even if the session stopped reading.
                if forwarding && forward.write_all(&line).await.is_err() {
                    forwarding = false;
                }
            }
            remote_exit
        });

        let completion = async move {
            let status = child.wait().await?;
            let remote_exit = tee
                .await
                .map_err(|e| ClusterError::Transport(format!("stderr forwarder failed: {e}")))?;
            decode_exit(status.code(), remote_exit)
        }
        .boxed();

        Ok(ExecSession::new(
            Box::new(stdout),
            Box::new(session_stderr),
            completion,
        ))
    }
}

fn create_args(namespace: &str) -> Vec<String> {
    ["create", "-n", namespace, "-f", "-", "-o", "json"]
        .map(String::from)
        .to_vec()
}

fn delete_args(name: &str, namespace: &str, mode: DeleteMode) -> Vec<String> {
    let mut args: Vec<String> = ["delete", "pod", name, "-n", namespace]
        .map(String::from)
        .to_vec();
    if mode == DeleteMode::Force {
        args.extend(
            ["--grace-period=0", "--force", "--cascade=foreground"].map(String::from),
        );
    }
    args.push("--wait=false".into());
    args
}

fn exec_args(name: &str, namespace: &str, request: &ExecRequest) -> Vec<String> {
    let mut args: Vec<String> = ["exec", "-n", namespace, name].map(String::from).to_vec();
    if let Some(ref container) = request.container {
        args.extend(["-c".to_string(), container.clone()]);
    }
    if request.stdin.is_some() {
        args.push("-i".into());
    }
    if request.tty {
        args.push("-t".into());
    }
    args.push("--".into());
    args.extend(request.command.iter().cloned());
    args
}

fn classify_failure(name: &str, stderr: &str) -> ClusterError {
    let stderr = stderr.trim();
    if stderr.contains("NotFound") || stderr.contains("not found") {
        ClusterError::pod_not_found(name)
    } else if stderr.contains("AlreadyExists") || stderr.contains("already exists") {
        ClusterError::AlreadyExists {
            kind: "pod",
            name: name.to_string(),
        }
    } else {
        ClusterError::Rejected(stderr.to_string())
    }
}

fn parse_exit_marker(line: &str) -> Option<i32> {
    line.trim().strip_prefix(EXIT_MARKER)?.trim().parse().ok()
}

/// kubectl exits with the remote code and prints a marker line; any other
/// failure means the exec itself broke.
fn decode_exit(kubectl_code: Option<i32>, remote_exit: Option<i32>) -> Result<i32, ClusterError> {
    match (kubectl_code, remote_exit) {
        (_, Some(code)) => Ok(code),
        (Some(0), None) => Ok(0),
        (Some(code), None) => Err(ClusterError::Transport(format!(
            "kubectl exec failed with exit code {code}"
        ))),
        (None, None) => Err(ClusterError::Transport(
            "kubectl exec terminated by signal".into(),
        )),
    }
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodJson>,
}

#[derive(Deserialize)]
struct PodJson {
    metadata: Metadata,
    #[serde(default)]
    spec: PodSpecJson,
    #[serde(default)]
    status: PodStatusJson,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Default, Deserialize)]
struct PodSpecJson {
    #[serde(default)]
    containers: Vec<ContainerJson>,
}

#[derive(Deserialize)]
struct ContainerJson {
    image: Option<String>,
}

#[derive(Default, Deserialize)]
struct PodStatusJson {
    phase: Option<String>,
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl From<PodJson> for PodStatus {
    fn from(pod: PodJson) -> Self {
        let ready = pod
            .status
            .conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True");
        Self {
            name: pod.metadata.name,
            namespace: pod.metadata.namespace,
            phase: pod
                .status
                .phase
                .as_deref()
                .map_or(PodPhase::Pending, PodPhase::parse),
            ready,
            image: pod.spec.containers.into_iter().next().and_then(|c| c.image),
            labels: pod.metadata.labels,
            created_at: pod.metadata.creation_timestamp,
        }
    }
}

fn parse_pod(bytes: &[u8]) -> Result<PodStatus, ClusterError> {
    let pod: PodJson = serde_json::from_slice(bytes)?;
    Ok(pod.into())
}

fn parse_pod_list(bytes: &[u8]) -> Result<Vec<PodStatus>, ClusterError> {
    let list: PodList = serde_json::from_slice(bytes)?;
    Ok(list.items.into_iter().map(PodStatus::from).collect())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const POD_JSON: &str = r#"{
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "sandboxed-s1",
            "namespace": "default",
            "labels": {"app": "sandboxed-s1", "created-by": "sandboxed-sdk"},
            "creationTimestamp": "2024-05-01T12:00:00Z"
        },
        "spec": {"containers": [{"name": "sandbox", "image": "python:3.9"}]},
        "status": {
            "phase": "Running",
            "conditions": [
                {"type": "Initialized", "status": "True"},
                {"type": "Ready", "status": "True"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_pod() {
        let pod = parse_pod(POD_JSON.as_bytes()).unwrap();
        assert_eq!(pod.name, "sandboxed-s1");
        assert_eq!(pod.namespace, "default");
        assert_eq!(pod.phase, PodPhase::Running);
        assert!(pod.ready);
        assert_eq!(pod.image.as_deref(), Some("python:3.9"));
        assert_eq!(pod.labels["created-by"], "sandboxed-sdk");
        assert_eq!(
            pod.created_at.unwrap().to_rfc3339(),
            "2024-05-01T12:00:00+00:00"
        );
    }

    #[test]
    fn test_parse_freshly_created_pod() {
        // `kubectl create` echoes the object before the scheduler touches it.
        let json = r#"{"metadata": {"name": "sandboxed-s1", "namespace": "team"}, "spec": {"containers": []}}"#;
        let pod = parse_pod(json.as_bytes()).unwrap();
        assert_eq!(pod.phase, PodPhase::Pending);
        assert!(!pod.ready);
        assert!(pod.image.is_none());
        assert!(pod.created_at.is_none());
    }

    #[test]
    fn test_ready_condition_false() {
        let json = POD_JSON.replace(
            r#"{"type": "Ready", "status": "True"}"#,
            r#"{"type": "Ready", "status": "False"}"#,
        );
        assert!(!parse_pod(json.as_bytes()).unwrap().ready);
    }

    #[test]
    fn test_parse_pod_list() {
        let json = format!(r#"{{"kind": "PodList", "items": [{POD_JSON}, {POD_JSON}]}}"#);
        let pods = parse_pod_list(json.as_bytes()).unwrap();
        assert_eq!(pods.len(), 2);
        assert!(parse_pod_list(br#"{"items": []}"#).unwrap().is_empty());
        assert!(matches!(
            parse_pod_list(b"not json"),
            Err(ClusterError::Decode(_))
        ));
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "sandboxed-s1",
            "Error from server (NotFound): pods \"sandboxed-s1\" not found\n",
        );
        assert!(err.is_not_found());

        let err = classify_failure(
            "sandboxed-s1",
            "Error from server (AlreadyExists): pods \"sandboxed-s1\" already exists",
        );
        assert!(matches!(err, ClusterError::AlreadyExists { .. }));

        let err = classify_failure("sandboxed-s1", "error: You must be logged in\n");
        assert_eq!(err.to_string(), "request rejected: error: You must be logged in");
    }

    #[test]
    fn test_exit_marker() {
        assert_eq!(
            parse_exit_marker("command terminated with exit code 42\n"),
            Some(42)
        );
        assert_eq!(parse_exit_marker("some other line"), None);
        assert_eq!(parse_exit_marker("command terminated with exit code x"), None);
    }

    #[test]
    fn test_decode_exit() {
        assert_eq!(decode_exit(Some(0), None).unwrap(), 0);
        assert_eq!(decode_exit(Some(3), Some(3)).unwrap(), 3);
        let err = decode_exit(Some(1), None).unwrap_err();
        assert_eq!(err.to_string(), "kubectl exec failed with exit code 1");
        assert!(decode_exit(None, None).is_err());
    }

    #[test]
    fn test_base_args() {
        let client = KubectlClient::new(ClusterConfig {
            context: Some("kind-dev".into()),
            kubeconfig: Some("/etc/kube/config".into()),
            ..Default::default()
        });
        assert_eq!(client.base_args(), vec![
            "--context",
            "kind-dev",
            "--kubeconfig",
            "/etc/kube/config"
        ]);
        assert!(KubectlClient::new(ClusterConfig::default()).base_args().is_empty());
    }

    #[test]
    fn test_delete_args() {
        assert_eq!(
            delete_args("sandboxed-s1", "default", DeleteMode::Force).join(" "),
            "delete pod sandboxed-s1 -n default --grace-period=0 --force --cascade=foreground --wait=false"
        );
        assert_eq!(
            delete_args("sandboxed-s1", "default", DeleteMode::Graceful).join(" "),
            "delete pod sandboxed-s1 -n default --wait=false"
        );
    }

    #[test]
    fn test_exec_args() {
        let request = ExecRequest::shell("echo hi");
        assert_eq!(exec_args("sandboxed-s1", "ns", &request), vec![
            "exec",
            "-n",
            "ns",
            "sandboxed-s1",
            "--",
            "sh",
            "-c",
            "echo hi"
        ]);

        let mut request = ExecRequest::shell("cat").with_stdin(b"x".to_vec()).with_tty(true);
        request.container = Some("sandbox".into());
        assert_eq!(
            exec_args("p", "ns", &request).join(" "),
            "exec -n ns p -c sandbox -i -t -- sh -c cat"
        );
    }

    #[test]
    fn test_create_args() {
        assert_eq!(create_args("team").join(" "), "create -n team -f - -o json");
    }

    #[cfg(unix)]
    mod process {
        use {
            super::*,
            crate::stream::{StreamError, drain},
            std::os::unix::fs::PermissionsExt,
        };

        /// Install a shell script posing as kubectl.
        fn fake_kubectl(dir: &tempfile::TempDir, body: &str) -> ClusterConfig {
            let path = dir.path().join("kubectl");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            ClusterConfig {
                kubectl: path.display().to_string(),
                ..Default::default()
            }
        }

        #[tokio::test]
        async fn test_exec_reports_remote_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let config = fake_kubectl(
                &dir,
                "echo out\necho 'real error' >&2\necho 'command terminated with exit code 3' >&2\nexit 3",
            );
            let client = KubectlClient::new(config);
            let session = client
                .exec("p", "default", ExecRequest::shell("false"))
                .await
                .unwrap();
            let out = drain(session).await.unwrap();
            assert_eq!(out.stdout, "out\n");
            assert_eq!(out.stderr, "real error\n");
            assert_eq!(out.exit_code, 3);
        }

        #[tokio::test]
        async fn test_exec_failure_is_transport_error() {
            let dir = tempfile::tempdir().unwrap();
            let config = fake_kubectl(&dir, "echo 'error: unable to upgrade connection' >&2\nexit 1");
            let client = KubectlClient::new(config);
            let session = client
                .exec("p", "default", ExecRequest::shell("true"))
                .await
                .unwrap();
            match drain(session).await.unwrap_err() {
                StreamError::Transport(message) => assert_eq!(
                    message,
                    "kubectl exec failed with exit code 1, stderr: error: unable to upgrade connection"
                ),
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_exec_forwards_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let config = fake_kubectl(&dir, "cat");
            let client = KubectlClient::new(config);
            let request = ExecRequest::shell("cat").with_stdin(b"from stdin".to_vec());
            let session = client.exec("p", "default", request).await.unwrap();
            let out = drain(session).await.unwrap();
            assert_eq!(out.stdout, "from stdin");
            assert_eq!(out.exit_code, 0);
        }

        #[tokio::test]
        async fn test_get_pod_not_found() {
            let dir = tempfile::tempdir().unwrap();
            let config = fake_kubectl(
                &dir,
                "echo 'Error from server (NotFound): pods \"p\" not found' >&2\nexit 1",
            );
            let err = KubectlClient::new(config)
                .get_pod("p", "default")
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }

        #[tokio::test]
        async fn test_create_pod_sends_manifest() {
            let dir = tempfile::tempdir().unwrap();
            // Echo the manifest back, as `kubectl create -o json` does.
            let config = fake_kubectl(&dir, "cat");
            let spec = PodSpec {
                name: "sandboxed-s1".into(),
                namespace: "default".into(),
                image: "python:3.9".into(),
                command: vec!["sh".into(), "-c".into(), "tail -f /dev/null".into()],
                labels: BTreeMap::from([("app".to_string(), "sandboxed-s1".to_string())]),
            };
            let pod = KubectlClient::new(config).create_pod(&spec).await.unwrap();
            assert_eq!(pod.name, "sandboxed-s1");
            assert_eq!(pod.image.as_deref(), Some("python:3.9"));
            assert_eq!(pod.labels["app"], "sandboxed-s1");
            assert!(!pod.ready);
        }
    }
}
