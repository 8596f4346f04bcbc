use std::time::Duration;

use thiserror::Error;

use crate::{cluster::PodPhase, sandbox::SandboxState, script::ExecStep};

/// Errors reported by a [`ClusterClient`](crate::cluster::ClusterClient).
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Transport(String),

    #[error("failed to launch cluster client: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode cluster response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no cluster backend available: {0}")]
    Unavailable(String),
}

impl ClusterError {
    pub fn pod_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "pod",
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Coarse classification used by the HTTP and tool façades to pick a status
/// code or error flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    InvalidRequest,
    NotFound,
    Conflict,
    Submission,
    ReadinessTimeout,
    Transport,
    ExecTimeout,
    Cluster,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Submission => "submission",
            Self::ReadinessTimeout => "readiness_timeout",
            Self::Transport => "transport",
            Self::ExecTimeout => "exec_timeout",
            Self::Cluster => "cluster",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid sandbox name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("sandbox {0} already exists")]
    AlreadyExists(String),

    #[error("sandbox {0} not found")]
    NotFound(String),

    #[error("sandbox {name} is {state}, not ready")]
    NotReady { name: String, state: SandboxState },

    #[error("sandbox {0} has been destroyed")]
    Destroyed(String),

    #[error("failed to create pod for sandbox {name}: {source}")]
    Submission {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error("failed to read status of pod {pod}: {source}")]
    Status {
        pod: String,
        #[source]
        source: ClusterError,
    },

    #[error("pod {pod} reached phase {phase} before becoming ready")]
    ProvisioningFailed { pod: String, phase: PodPhase },

    #[error("timeout waiting for sandbox {name} (pod {pod}) to be ready after {}s", .timeout.as_secs())]
    ReadinessTimeout {
        name: String,
        pod: String,
        timeout: Duration,
    },

    #[error("exec failed in sandbox {name}: {message}")]
    Transport { name: String, message: String },

    #[error("{step} step failed in sandbox {name} with exit code {exit_code}: {stderr}")]
    StepFailed {
        name: String,
        step: ExecStep,
        exit_code: i32,
        stderr: String,
    },

    #[error("command in sandbox {name} timed out after {}s", .timeout.as_secs())]
    ExecTimeout { name: String, timeout: Duration },

    #[error("failed to delete sandbox {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("sandbox engine has shut down")]
    EngineShutdown,
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedLanguage(_) => ErrorKind::Resolution,
            Self::InvalidName { .. } | Self::InvalidOption(_) => ErrorKind::InvalidRequest,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) | Self::NotReady { .. } | Self::Destroyed(_) => {
                ErrorKind::Conflict
            },
            Self::Submission { .. } | Self::Status { .. } | Self::ProvisioningFailed { .. } => {
                ErrorKind::Submission
            },
            Self::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Self::Transport { .. } | Self::StepFailed { .. } => ErrorKind::Transport,
            Self::ExecTimeout { .. } => ErrorKind::ExecTimeout,
            Self::Delete { .. } | Self::Cluster(_) => ErrorKind::Cluster,
            Self::EngineShutdown => ErrorKind::Internal,
        }
    }
}

pub type Result<T, E = SandboxError> = std::result::Result<T, E>;
