//! Config schema types (cluster access, sandbox lifecycle, HTTP server).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxedConfig {
    pub cluster: ClusterConfig,
    pub lifecycle: LifecycleConfig,
    pub server: ServerConfig,
}

/// Which cluster backend drives sandbox pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `kubectl`, failing when the binary does not run.
    #[default]
    Auto,
    Kubectl,
    /// In-process pods; commands run directly on the host.
    Local,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Kubectl => f.write_str("kubectl"),
            Self::Local => f.write_str("local"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "kubectl" | "kubernetes" | "k8s" => Ok(Self::Kubectl),
            "local" | "none" => Ok(Self::Local),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// How to reach the orchestration API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub backend: Backend,
    /// Path or name of the `kubectl` binary.
    pub kubectl: String,
    /// kubeconfig context to use instead of the current one.
    pub context: Option<String>,
    /// Explicit kubeconfig file.
    pub kubeconfig: Option<String>,
    /// Namespace used when a request does not name one.
    pub namespace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            kubectl: "kubectl".into(),
            context: None,
            kubeconfig: None,
            namespace: "default".into(),
        }
    }
}

/// Sandbox lifecycle timings and exec behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Prepended to the sandbox name to form the pod name.
    pub pod_prefix: String,
    pub ready_timeout_secs: u64,
    /// Readiness timeout for the create-and-run flow.
    pub composite_ready_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Upper bound on a single exec round-trip. `0` disables the bound.
    pub exec_timeout_secs: u64,
    /// Allocate a TTY for exec sessions (merges stderr into stdout).
    pub tty: bool,
    /// Force-delete the pod when it never becomes ready.
    pub cleanup_on_ready_timeout: bool,
    /// Directory inside the container where scripts are written.
    pub script_dir: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pod_prefix: "sandboxed-".into(),
            ready_timeout_secs: 120,
            composite_ready_timeout_secs: 300,
            poll_interval_ms: 2000,
            exec_timeout_secs: 600,
            tty: false,
            cleanup_on_ready_timeout: true,
            script_dir: "/tmp".into(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}
