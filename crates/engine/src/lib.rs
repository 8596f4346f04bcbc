//! Sandbox lifecycle and command execution on pods.
//!
//! A sandbox is a single-container pod running a language image with an idle
//! entry process. The engine provisions it, waits for readiness, runs shell
//! commands or stored scripts through the exec channel and deletes the pod.
//!
//! Backends: `kubectl` (real clusters) and `local` (host processes, no
//! isolation).

pub mod cluster;
pub mod engine;
pub mod error;
pub mod kubectl;
pub mod language;
pub mod local;
pub mod options;
pub mod readiness;
pub mod registry;
pub mod sandbox;
pub mod script;
pub mod stream;

#[cfg(test)]
mod fake;

pub use {
    cluster::{
        ClusterClient, DeleteMode, ExecRequest, ExecSession, PodPhase, PodSpec, PodStatus,
        create_cluster_client,
    },
    engine::{EngineConfig, SandboxEngine},
    error::{ClusterError, ErrorKind, Result, SandboxError},
    language::Language,
    options::{SandboxOption, SandboxOptions},
    registry::SandboxRegistry,
    sandbox::{CommandResult, Sandbox, SandboxInfo, SandboxState},
    script::ExecStep,
};
