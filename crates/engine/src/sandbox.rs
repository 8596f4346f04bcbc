use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{
    engine::{EngineInner, SandboxEngine},
    error::{Result, SandboxError},
    language::Language,
};

/// Lifecycle state of a sandbox.
///
/// `Requested -> Provisioning -> Ready -> (Running -> Ready)* -> Destroying -> Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Requested,
    Provisioning,
    Ready,
    Running,
    Destroying,
    Destroyed,
}

impl SandboxState {
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Destroying | Self::Destroyed)
    }
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Provisioning => f.write_str("provisioning"),
            Self::Ready => f.write_str("ready"),
            Self::Running => f.write_str("running"),
            Self::Destroying => f.write_str("destroying"),
            Self::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// Output of a command run inside a sandbox.
///
/// A non-zero `exit_code` is a normal outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Serializable snapshot of a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInfo {
    pub name: String,
    pub pod_name: String,
    pub namespace: String,
    pub language: Language,
    pub image: String,
    pub state: SandboxState,
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) struct SandboxInner {
    pub(crate) name: String,
    pub(crate) pod_name: String,
    pub(crate) namespace: String,
    pub(crate) language: Language,
    pub(crate) image: String,
    pub(crate) labels: BTreeMap<String, String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) exec_timeout: Option<Duration>,
    /// Never held across an await, so drop guards can update it.
    pub(crate) state: Mutex<SandboxState>,
    pub(crate) engine: Weak<EngineInner>,
}

impl SandboxInner {
    pub(crate) fn state(&self) -> SandboxState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: SandboxState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Apply `f` to the state under the lock.
    pub(crate) fn update_state<R>(&self, f: impl FnOnce(&mut SandboxState) -> R) -> R {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Handle to a sandbox. Clones refer to the same sandbox.
///
/// The handle does not keep its engine alive; once the engine is dropped,
/// operations fail with [`SandboxError::EngineShutdown`].
#[derive(Clone)]
pub struct Sandbox {
    pub(crate) inner: Arc<SandboxInner>,
}

impl Sandbox {
    pub(crate) fn from_inner(inner: SandboxInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn pod_name(&self) -> &str {
        &self.inner.pod_name
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn language(&self) -> Language {
        self.inner.language
    }

    pub fn image(&self) -> &str {
        &self.inner.image
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.inner.labels
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub async fn state(&self) -> SandboxState {
        self.inner.state()
    }

    pub async fn info(&self) -> SandboxInfo {
        SandboxInfo {
            name: self.inner.name.clone(),
            pod_name: self.inner.pod_name.clone(),
            namespace: self.inner.namespace.clone(),
            language: self.inner.language,
            image: self.inner.image.clone(),
            state: self.state().await,
            labels: self.inner.labels.clone(),
            created_at: self.inner.created_at,
        }
    }

    /// Run `sh -c <command>` in the sandbox.
    pub async fn run(&self, command: &str) -> Result<CommandResult> {
        self.engine()?.run_in(self, command).await
    }

    /// Store `script` in the sandbox and run it with the sandbox's language.
    pub async fn exec(&self, script: &str) -> Result<CommandResult> {
        self.engine()?.exec_in(self, script).await
    }

    /// Delete the backing pod. Calling this more than once is fine.
    pub async fn destroy(&self) -> Result<()> {
        self.engine()?.destroy_sandbox(self).await
    }

    pub async fn logs(&self) -> Result<String> {
        self.engine()?.logs_of(self).await
    }

    pub fn ptr_eq(&self, other: &Sandbox) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn engine(&self) -> Result<SandboxEngine> {
        self.inner
            .engine
            .upgrade()
            .map(SandboxEngine::from_inner)
            .ok_or(SandboxError::EngineShutdown)
    }

    #[cfg(test)]
    pub(crate) fn detached(name: &str, state: SandboxState) -> Self {
        Self::from_inner(SandboxInner {
            name: name.to_string(),
            pod_name: format!("sandboxed-{name}"),
            namespace: "default".into(),
            language: Language::Python,
            image: Language::Python.image().into(),
            labels: BTreeMap::new(),
            created_at: Utc::now(),
            exec_timeout: None,
            state: Mutex::new(state),
            engine: Weak::new(),
        })
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("name", &self.inner.name)
            .field("pod_name", &self.inner.pod_name)
            .field("namespace", &self.inner.namespace)
            .field("language", &self.inner.language)
            .finish_non_exhaustive()
    }
}
