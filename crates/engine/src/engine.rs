use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {
    chrono::Utc,
    sandboxed_config::SandboxedConfig,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

use crate::{
    cluster::{ClusterClient, DeleteMode, ExecRequest, PodSpec, PodStatus},
    error::{Result, SandboxError},
    language::Language,
    options::{SandboxOption, SandboxOptions, is_dns_label},
    readiness::{ReadinessPolicy, wait_ready},
    registry::{ExecLocks, SandboxRegistry},
    sandbox::{CommandResult, Sandbox, SandboxInner, SandboxState},
    script::{ExecStep, ScriptPlan},
    stream::{self, StreamError},
};

/// Entry process of every sandbox container: idle until deleted.
pub const KEEPALIVE_COMMAND: [&str; 3] = ["sh", "-c", "tail -f /dev/null"];

pub const APP_LABEL: &str = "app";
pub const CREATED_BY_LABEL: &str = "created-by";
pub const CREATED_BY: &str = "sandboxed-sdk";
pub const LANGUAGE_LABEL: &str = "sandboxed.io/language";

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Namespace used when a request does not name one.
    pub namespace: String,
    pub pod_prefix: String,
    pub ready_timeout: Duration,
    /// Readiness timeout for [`SandboxEngine::create_and_run`] and
    /// [`SandboxEngine::run_oneshot`].
    pub composite_ready_timeout: Duration,
    pub poll_interval: Duration,
    pub exec_timeout: Option<Duration>,
    pub tty: bool,
    pub cleanup_on_ready_timeout: bool,
    pub script_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            pod_prefix: "sandboxed-".into(),
            ready_timeout: Duration::from_secs(120),
            composite_ready_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
            exec_timeout: Some(Duration::from_secs(600)),
            tty: false,
            cleanup_on_ready_timeout: true,
            script_dir: "/tmp".into(),
        }
    }
}

impl From<&SandboxedConfig> for EngineConfig {
    fn from(cfg: &SandboxedConfig) -> Self {
        let lifecycle = &cfg.lifecycle;
        Self {
            namespace: cfg.cluster.namespace.clone(),
            pod_prefix: lifecycle.pod_prefix.clone(),
            ready_timeout: Duration::from_secs(lifecycle.ready_timeout_secs),
            composite_ready_timeout: Duration::from_secs(lifecycle.composite_ready_timeout_secs),
            poll_interval: Duration::from_millis(lifecycle.poll_interval_ms.max(1)),
            exec_timeout: (lifecycle.exec_timeout_secs > 0)
                .then(|| Duration::from_secs(lifecycle.exec_timeout_secs)),
            tty: lifecycle.tty,
            cleanup_on_ready_timeout: lifecycle.cleanup_on_ready_timeout,
            script_dir: lifecycle.script_dir.clone(),
        }
    }
}

pub(crate) struct EngineInner {
    client: Arc<dyn ClusterClient>,
    config: EngineConfig,
    registry: SandboxRegistry,
    locks: ExecLocks,
}

/// Creates, runs commands in, and destroys sandboxes.
///
/// Cloning is cheap; clones share the cluster client and the registry.
#[derive(Clone)]
pub struct SandboxEngine {
    inner: Arc<EngineInner>,
}

impl SandboxEngine {
    pub fn new(client: Arc<dyn ClusterClient>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                client,
                config,
                registry: SandboxRegistry::new(),
                locks: ExecLocks::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.inner.client
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.client.backend_name()
    }

    pub fn registry(&self) -> &SandboxRegistry {
        &self.inner.registry
    }

    pub fn pod_name(&self, name: &str) -> String {
        format!("{}{name}", self.inner.config.pod_prefix)
    }

    /// Provision a sandbox and wait until it is ready.
    pub async fn create(
        &self,
        name: &str,
        language: &str,
        options: &[SandboxOption],
    ) -> Result<Sandbox> {
        let options = SandboxOptions::merge(options)?;
        self.create_with(name, language, options).await
    }

    /// Like [`create`](Self::create) with options that are already merged.
    pub async fn create_with(
        &self,
        name: &str,
        language: &str,
        options: SandboxOptions,
    ) -> Result<Sandbox> {
        self.create_inner(name, language, options, self.inner.config.ready_timeout)
            .await
    }

    async fn create_inner(
        &self,
        name: &str,
        language: &str,
        options: SandboxOptions,
        default_ready_timeout: Duration,
    ) -> Result<Sandbox> {
        let pod_name = self.validated_pod_name(name)?;
        let language = Language::resolve(language)?;

        let mut reservation = Reservation::acquire(&self.inner, name).await?;
        let result = self
            .provision(
                &mut reservation,
                pod_name,
                language,
                options,
                default_ready_timeout,
            )
            .await;
        match result {
            Ok(sandbox) => {
                reservation.commit(sandbox.clone()).await;
                Ok(sandbox)
            },
            Err(e) => {
                reservation.release();
                #[cfg(feature = "metrics")]
                counter!("sandboxed_sandbox_create_failures_total", "kind" => e.kind().as_str())
                    .increment(1);
                Err(e)
            },
        }
    }

    async fn provision(
        &self,
        reservation: &mut Reservation,
        pod_name: String,
        language: Language,
        options: SandboxOptions,
        default_ready_timeout: Duration,
    ) -> Result<Sandbox> {
        let config = &self.inner.config;
        let name = reservation.name.clone();
        let name = name.as_str();
        let namespace = options
            .namespace
            .unwrap_or_else(|| config.namespace.clone());

        let mut labels = options.labels;
        labels.extend(managed_labels(&pod_name, language));

        let sandbox = Sandbox::from_inner(SandboxInner {
            name: name.to_string(),
            pod_name: pod_name.clone(),
            namespace: namespace.clone(),
            language,
            image: language.image().to_string(),
            labels: labels.clone(),
            created_at: Utc::now(),
            exec_timeout: options.exec_timeout,
            state: Mutex::new(SandboxState::Requested),
            engine: Arc::downgrade(&self.inner),
        });

        let spec = PodSpec {
            name: pod_name.clone(),
            namespace: namespace.clone(),
            image: language.image().to_string(),
            command: KEEPALIVE_COMMAND.iter().map(|s| s.to_string()).collect(),
            labels,
        };

        info!(
            sandbox = name,
            pod = %pod_name,
            namespace = %namespace,
            image = %spec.image,
            "creating sandbox"
        );
        reservation.submitted(&pod_name, &namespace);
        self.inner
            .client
            .create_pod(&spec)
            .await
            .map_err(|source| SandboxError::Submission {
                name: name.to_string(),
                source,
            })?;
        sandbox.inner.set_state(SandboxState::Provisioning);

        let policy = ReadinessPolicy {
            timeout: options.ready_timeout.unwrap_or(default_ready_timeout),
            interval: config.poll_interval,
        };
        let started = Instant::now();
        match wait_ready(self.inner.client.as_ref(), name, &pod_name, &namespace, policy).await {
            Ok(_) => {
                sandbox.inner.set_state(SandboxState::Ready);
                info!(
                    sandbox = name,
                    pod = %pod_name,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "sandbox ready"
                );
                #[cfg(feature = "metrics")]
                {
                    counter!("sandboxed_sandboxes_created_total").increment(1);
                    histogram!("sandboxed_readiness_wait_seconds")
                        .record(started.elapsed().as_secs_f64());
                }
                Ok(sandbox)
            },
            Err(e) => {
                warn!(sandbox = name, pod = %pod_name, error = %e, "sandbox never became ready");
                if config.cleanup_on_ready_timeout {
                    self.remove_orphan(&sandbox).await;
                }
                Err(e)
            },
        }
    }

    /// Best-effort forced delete of a pod that failed to become ready.
    async fn remove_orphan(&self, sandbox: &Sandbox) {
        match self
            .inner
            .client
            .delete_pod(sandbox.pod_name(), sandbox.namespace(), DeleteMode::Force)
            .await
        {
            Ok(()) => {
                sandbox.inner.set_state(SandboxState::Destroyed);
                debug!(pod = sandbox.pod_name(), "removed pod that never became ready");
            },
            Err(e) if e.is_not_found() => {
                sandbox.inner.set_state(SandboxState::Destroyed);
            },
            Err(e) => {
                warn!(pod = sandbox.pod_name(), error = %e, "failed to remove pod that never became ready");
            },
        }
    }

    fn validated_pod_name(&self, name: &str) -> Result<String> {
        let invalid = |reason| SandboxError::InvalidName {
            name: name.to_string(),
            reason,
        };
        if name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        let pod_name = self.pod_name(name);
        if pod_name.len() > 63 {
            return Err(invalid("pod name would exceed 63 characters"));
        }
        if !is_dns_label(&pod_name) {
            return Err(invalid(
                "use lowercase letters, digits and '-', starting and ending with a letter or digit",
            ));
        }
        Ok(pod_name)
    }

    /// Build a handle for a pod that already exists and register it.
    ///
    /// Returns the registered handle if the name is already known.
    pub async fn attach(&self, name: &str, namespace: Option<&str>) -> Result<Sandbox> {
        if let Some(existing) = self.inner.registry.get(name).await {
            return Ok(existing);
        }
        let pod_name = self.validated_pod_name(name)?;
        let namespace = namespace.unwrap_or(&self.inner.config.namespace);

        let status = self
            .inner
            .client
            .get_pod(&pod_name, namespace)
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    SandboxError::NotFound(name.to_string())
                } else {
                    SandboxError::Status {
                        pod: pod_name.clone(),
                        source,
                    }
                }
            })?;
        if !status.ready {
            return Err(SandboxError::NotReady {
                name: name.to_string(),
                state: SandboxState::Provisioning,
            });
        }
        let language = language_of(&status)?;

        let sandbox = Sandbox::from_inner(SandboxInner {
            name: name.to_string(),
            pod_name,
            namespace: namespace.to_string(),
            language,
            image: status
                .image
                .clone()
                .unwrap_or_else(|| language.image().to_string()),
            labels: status.labels.clone(),
            created_at: status.created_at.unwrap_or_else(Utc::now),
            exec_timeout: None,
            state: Mutex::new(SandboxState::Ready),
            engine: Arc::downgrade(&self.inner),
        });
        self.inner.registry.add(sandbox.clone()).await?;
        info!(sandbox = name, pod = sandbox.pod_name(), "attached to existing sandbox");
        Ok(sandbox)
    }

    pub async fn get(&self, name: &str) -> Result<Sandbox> {
        self.inner
            .registry
            .get(name)
            .await
            .ok_or_else(|| SandboxError::NotFound(name.to_string()))
    }

    pub async fn list(&self) -> Vec<Sandbox> {
        self.inner.registry.list().await
    }

    pub async fn run(&self, name: &str, command: &str) -> Result<CommandResult> {
        let sandbox = self.get(name).await?;
        self.run_in(&sandbox, command).await
    }

    pub async fn exec(&self, name: &str, script: &str) -> Result<CommandResult> {
        let sandbox = self.get(name).await?;
        self.exec_in(&sandbox, script).await
    }

    pub async fn logs(&self, name: &str) -> Result<String> {
        let sandbox = self.get(name).await?;
        self.logs_of(&sandbox).await
    }

    /// Destroy a sandbox by name.
    ///
    /// Unregistered names still get a forced delete of the derived pod, so
    /// repeated calls and sandboxes created by another process both succeed.
    pub async fn destroy(&self, name: &str, namespace: Option<&str>) -> Result<()> {
        if let Some(sandbox) = self.inner.registry.get(name).await
            && namespace.is_none_or(|ns| ns == sandbox.namespace())
        {
            return self.destroy_sandbox(&sandbox).await;
        }

        let pod_name = self.validated_pod_name(name)?;
        let namespace = namespace.unwrap_or(&self.inner.config.namespace);
        match self
            .inner
            .client
            .delete_pod(&pod_name, namespace, DeleteMode::Force)
            .await
        {
            Ok(()) => {
                info!(sandbox = name, pod = %pod_name, "destroyed unregistered sandbox");
                Ok(())
            },
            Err(e) if e.is_not_found() => {
                debug!(sandbox = name, pod = %pod_name, "sandbox already gone");
                Ok(())
            },
            Err(source) => Err(SandboxError::Delete {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Destroy every registered sandbox. Returns how many were destroyed.
    pub async fn destroy_all(&self) -> usize {
        let mut destroyed = 0;
        for sandbox in self.inner.registry.list().await {
            match self.destroy_sandbox(&sandbox).await {
                Ok(()) => destroyed += 1,
                Err(e) => warn!(sandbox = sandbox.name(), error = %e, "failed to destroy sandbox"),
            }
        }
        destroyed
    }

    /// Pods in `namespace` that were created by this engine.
    pub async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<PodStatus>> {
        let namespace = namespace.unwrap_or(&self.inner.config.namespace);
        let pods = self.inner.client.list_pods(namespace).await?;
        Ok(pods
            .into_iter()
            .filter(|p| p.labels.get(CREATED_BY_LABEL).map(String::as_str) == Some(CREATED_BY))
            .collect())
    }

    /// Create a sandbox with the composite readiness timeout, run each
    /// command in order and optionally delete the pod afterwards.
    ///
    /// Stops at the first command that fails to run; non-zero exit codes do
    /// not stop the sequence.
    pub async fn create_and_run(
        &self,
        name: &str,
        language: &str,
        options: &[SandboxOption],
        commands: &[String],
        cleanup: bool,
    ) -> Result<Vec<CommandResult>> {
        let options = SandboxOptions::merge(options)?;
        let sandbox = self
            .create_inner(
                name,
                language,
                options,
                self.inner.config.composite_ready_timeout,
            )
            .await?;

        let mut results = Vec::with_capacity(commands.len());
        let mut failure = None;
        for command in commands {
            match self.run_in(&sandbox, command).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    failure = Some(e);
                    break;
                },
            }
        }

        if cleanup && let Err(e) = self.teardown(&sandbox, DeleteMode::Graceful).await {
            warn!(sandbox = name, error = %e, "cleanup after run failed");
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }

    /// Run a script in a throwaway sandbox that is always destroyed.
    pub async fn run_oneshot(
        &self,
        language: &str,
        script: &str,
        options: &[SandboxOption],
    ) -> Result<CommandResult> {
        let options = SandboxOptions::merge(options)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("oneshot-{}", &id[..8]);
        let sandbox = self
            .create_inner(
                &name,
                language,
                options,
                self.inner.config.composite_ready_timeout,
            )
            .await?;

        let result = self.exec_in(&sandbox, script).await;
        if let Err(e) = self.teardown(&sandbox, DeleteMode::Force).await {
            warn!(sandbox = %name, error = %e, "failed to destroy one-shot sandbox");
        }
        result
    }

    pub(crate) async fn run_in(&self, sandbox: &Sandbox, command: &str) -> Result<CommandResult> {
        let _guard = self.inner.locks.acquire(sandbox.pod_name()).await;
        let running = self.begin_run(sandbox)?;
        let result = self.exec_raw(sandbox, command).await;
        drop(running);
        record_exec(&result);
        result
    }

    pub(crate) async fn exec_in(&self, sandbox: &Sandbox, script: &str) -> Result<CommandResult> {
        let plan = ScriptPlan::new(sandbox.language(), &self.inner.config.script_dir, script);
        let _guard = self.inner.locks.acquire(sandbox.pod_name()).await;
        let running = self.begin_run(sandbox)?;
        let result = self.run_plan(sandbox, &plan).await;
        drop(running);
        record_exec(&result);
        result
    }

    async fn run_plan(&self, sandbox: &Sandbox, plan: &ScriptPlan) -> Result<CommandResult> {
        let mut last = CommandResult::default();
        for (step, command) in plan.steps() {
            let result = self.exec_raw(sandbox, command).await?;
            if *step != ExecStep::Run && !result.success() {
                let detail = if result.stderr.trim().is_empty() {
                    result.stdout.trim()
                } else {
                    result.stderr.trim()
                };
                return Err(SandboxError::StepFailed {
                    name: sandbox.name().to_string(),
                    step: *step,
                    exit_code: result.exit_code,
                    stderr: detail.to_string(),
                });
            }
            last = result;
        }
        Ok(last)
    }

    /// Mark the sandbox `Running`. The returned guard puts it back to
    /// `Ready` when dropped, including when the call is cancelled.
    fn begin_run<'a>(&self, sandbox: &'a Sandbox) -> Result<TransientState<'a>> {
        sandbox.inner.update_state(|state| match *state {
            SandboxState::Ready => {
                *state = SandboxState::Running;
                Ok(TransientState {
                    sandbox,
                    transient: SandboxState::Running,
                    restore: SandboxState::Ready,
                })
            },
            s if s.is_gone() => Err(SandboxError::Destroyed(sandbox.name().to_string())),
            s => Err(SandboxError::NotReady {
                name: sandbox.name().to_string(),
                state: s,
            }),
        })
    }

    async fn exec_raw(&self, sandbox: &Sandbox, command: &str) -> Result<CommandResult> {
        let config = &self.inner.config;
        let timeout = sandbox.inner.exec_timeout.or(config.exec_timeout);
        let request = ExecRequest::shell(command).with_tty(config.tty);

        debug!(sandbox = sandbox.name(), command, "exec");
        let started = Instant::now();
        let outcome = stream::execute(
            self.inner.client.as_ref(),
            sandbox.pod_name(),
            sandbox.namespace(),
            request,
            timeout,
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(out) => {
                debug!(
                    sandbox = sandbox.name(),
                    exit_code = out.exit_code,
                    duration_ms,
                    "exec done"
                );
                Ok(CommandResult {
                    stdout: out.stdout,
                    stderr: out.stderr,
                    exit_code: out.exit_code,
                    duration_ms,
                })
            },
            Err(StreamError::Transport(message)) => {
                warn!(sandbox = sandbox.name(), error = %message, "exec transport failure");
                Err(SandboxError::Transport {
                    name: sandbox.name().to_string(),
                    message,
                })
            },
            Err(StreamError::TimedOut(limit)) => {
                warn!(sandbox = sandbox.name(), command, "exec timeout");
                Err(SandboxError::ExecTimeout {
                    name: sandbox.name().to_string(),
                    timeout: limit,
                })
            },
        }
    }

    pub(crate) async fn destroy_sandbox(&self, sandbox: &Sandbox) -> Result<()> {
        self.teardown(sandbox, DeleteMode::Force).await
    }

    async fn teardown(&self, sandbox: &Sandbox, mode: DeleteMode) -> Result<()> {
        let previous = sandbox.inner.update_state(|state| {
            (!state.is_gone()).then(|| std::mem::replace(state, SandboxState::Destroying))
        });
        let Some(previous) = previous else {
            self.inner.registry.remove_handle(sandbox).await;
            return Ok(());
        };
        // Back to `previous` unless the delete below completes.
        let _destroying = TransientState {
            sandbox,
            transient: SandboxState::Destroying,
            restore: previous,
        };

        let deleted = self
            .inner
            .client
            .delete_pod(sandbox.pod_name(), sandbox.namespace(), mode)
            .await;
        match deleted {
            Ok(()) => info!(sandbox = sandbox.name(), pod = sandbox.pod_name(), "sandbox destroyed"),
            Err(e) if e.is_not_found() => {
                debug!(sandbox = sandbox.name(), pod = sandbox.pod_name(), "pod already gone");
            },
            Err(source) => {
                return Err(SandboxError::Delete {
                    name: sandbox.name().to_string(),
                    source,
                });
            },
        }

        sandbox.inner.set_state(SandboxState::Destroyed);
        self.inner.registry.remove_handle(sandbox).await;
        self.inner.locks.forget(sandbox.pod_name());
        #[cfg(feature = "metrics")]
        counter!("sandboxed_sandboxes_destroyed_total").increment(1);
        Ok(())
    }

    pub(crate) async fn logs_of(&self, sandbox: &Sandbox) -> Result<String> {
        self.inner
            .client
            .pod_logs(sandbox.pod_name(), sandbox.namespace())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    SandboxError::NotFound(sandbox.name().to_string())
                } else {
                    SandboxError::Cluster(e)
                }
            })
    }
}

/// A claimed sandbox name that is not yet registered.
///
/// Dropping it unsettled, as when the create future is cancelled, frees the
/// name and force-deletes any pod already submitted for it.
struct Reservation {
    engine: Arc<EngineInner>,
    name: String,
    pod: Option<(String, String)>,
    settled: bool,
}

impl Reservation {
    async fn acquire(engine: &Arc<EngineInner>, name: &str) -> Result<Self> {
        engine.registry.reserve(name).await?;
        Ok(Self {
            engine: Arc::clone(engine),
            name: name.to_string(),
            pod: None,
            settled: false,
        })
    }

    fn submitted(&mut self, pod: &str, namespace: &str) {
        self.pod = Some((pod.to_string(), namespace.to_string()));
    }

    async fn commit(mut self, sandbox: Sandbox) {
        self.engine.registry.commit(sandbox).await;
        self.settled = true;
    }

    /// Free the name after a failure that already handled the pod.
    fn release(mut self) {
        self.engine.registry.release(&self.name);
        self.settled = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.engine.registry.release(&self.name);
        let Some((pod, namespace)) = self.pod.take() else {
            return;
        };
        warn!(sandbox = %self.name, pod = %pod, "create cancelled, removing pod");
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(pod = %pod, "no runtime to remove cancelled pod");
            return;
        };
        let client = Arc::clone(&self.engine.client);
        handle.spawn(async move {
            match client.delete_pod(&pod, &namespace, DeleteMode::Force).await {
                Ok(()) => debug!(pod = %pod, "removed pod of cancelled create"),
                Err(e) if e.is_not_found() => {},
                Err(e) => warn!(pod = %pod, error = %e, "failed to remove pod of cancelled create"),
            }
        });
    }
}

/// Returns a sandbox from a transient state to `restore` on drop, unless
/// something else moved it on in the meantime.
struct TransientState<'a> {
    sandbox: &'a Sandbox,
    transient: SandboxState,
    restore: SandboxState,
}

impl Drop for TransientState<'_> {
    fn drop(&mut self) {
        self.sandbox.inner.update_state(|state| {
            if *state == self.transient {
                *state = self.restore;
            }
        });
    }
}

/// Language recorded on the pod, falling back to matching its image.
fn language_of(status: &PodStatus) -> Result<Language> {
    if let Some(label) = status.labels.get(LANGUAGE_LABEL) {
        return Language::resolve(label);
    }
    let image = status.image.as_deref().unwrap_or_default();
    Language::ALL
        .into_iter()
        .find(|lang| lang.image() == image)
        .ok_or_else(|| SandboxError::UnsupportedLanguage(image.to_string()))
}

#[cfg(feature = "metrics")]
fn record_exec(result: &Result<CommandResult>) {
    let outcome = match result {
        Ok(r) if r.success() => "success",
        Ok(_) => "nonzero_exit",
        Err(e) => e.kind().as_str(),
    };
    counter!("sandboxed_exec_total", "outcome" => outcome).increment(1);
    if let Ok(r) = result {
        histogram!("sandboxed_exec_duration_seconds").record(r.duration().as_secs_f64());
    }
}

#[cfg(not(feature = "metrics"))]
fn record_exec(_result: &Result<CommandResult>) {}

/// Labels every sandbox pod carries, for callers building selectors.
pub fn managed_labels(pod_name: &str, language: Language) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), pod_name.to_string()),
        (CREATED_BY_LABEL.to_string(), CREATED_BY.to_string()),
        (LANGUAGE_LABEL.to_string(), language.as_str().to_string()),
    ])
}
