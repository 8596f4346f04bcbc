//! Scripted in-memory cluster used by unit tests.

use std::{
    collections::HashMap,
    io::Cursor,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, futures::FutureExt};

use crate::{
    cluster::{ClusterClient, DeleteMode, ExecRequest, ExecSession, PodPhase, PodSpec, PodStatus},
    error::ClusterError,
};

/// What a scripted exec produces.
#[derive(Debug, Clone)]
pub(crate) enum FakeExec {
    Output {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    /// The session starts, then fails after writing `stderr`.
    Broken { error: String, stderr: String },
    /// The exec call itself is refused.
    Refused(String),
    /// The remote command never finishes.
    Hang,
}

impl FakeExec {
    pub(crate) fn ok(stdout: &str) -> Self {
        Self::Output {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub(crate) fn exit(code: i32, stderr: &str) -> Self {
        Self::Output {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: code,
        }
    }
}

type ExecHandler = Box<dyn Fn(&ExecRequest) -> FakeExec + Send + Sync>;
type ErrorFactory = Box<dyn Fn() -> ClusterError + Send + Sync>;

struct FakePod {
    status: PodStatus,
    polls: usize,
}

pub(crate) struct FakeCluster {
    pods: Mutex<HashMap<(String, String), FakePod>>,
    /// `None` means the pod never becomes ready.
    ready_after_polls: Option<usize>,
    terminal_phase: Option<PodPhase>,
    create_error: Option<ErrorFactory>,
    delete_error: Option<ErrorFactory>,
    exec_handler: ExecHandler,
    exec_delay: Option<Duration>,
    exec_log: Mutex<Vec<Vec<String>>>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    get_calls: AtomicUsize,
    exec_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self {
            pods: Mutex::new(HashMap::new()),
            ready_after_polls: Some(1),
            terminal_phase: None,
            create_error: None,
            delete_error: None,
            exec_handler: Box::new(|_| FakeExec::ok("ok")),
            exec_delay: None,
            exec_log: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            exec_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn ready_after(mut self, polls: usize) -> Self {
        self.ready_after_polls = Some(polls);
        self
    }

    pub(crate) fn never_ready(mut self) -> Self {
        self.ready_after_polls = None;
        self
    }

    pub(crate) fn ending_in(mut self, phase: PodPhase) -> Self {
        self.ready_after_polls = None;
        self.terminal_phase = Some(phase);
        self
    }

    pub(crate) fn failing_create(mut self, message: &'static str) -> Self {
        self.create_error = Some(Box::new(move || ClusterError::Rejected(message.into())));
        self
    }

    pub(crate) fn failing_delete(mut self, message: &'static str) -> Self {
        self.delete_error = Some(Box::new(move || ClusterError::Rejected(message.into())));
        self
    }

    pub(crate) fn with_exec(
        mut self,
        handler: impl Fn(&ExecRequest) -> FakeExec + Send + Sync + 'static,
    ) -> Self {
        self.exec_handler = Box::new(handler);
        self
    }

    pub(crate) fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Register a pod as if it had been created out of band.
    pub(crate) fn insert_pod(&self, status: PodStatus) {
        let key = (status.namespace.clone(), status.name.clone());
        self.lock_pods().insert(key, FakePod { status, polls: 0 });
    }

    pub(crate) fn has_pod(&self, name: &str, namespace: &str) -> bool {
        self.lock_pods()
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn exec_log(&self) -> Vec<Vec<String>> {
        self.exec_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn lock_pods(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), FakePod>> {
        self.pods
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn reader(text: String) -> crate::cluster::BoxedReader {
    Box::new(Cursor::new(text.into_bytes()))
}

#[async_trait]
impl ClusterClient for FakeCluster {
    fn backend_name(&self) -> &'static str {
        "fake"
    }

    async fn create_pod(&self, spec: &PodSpec) -> Result<PodStatus, ClusterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref make) = self.create_error {
            return Err(make());
        }
        let key = (spec.namespace.clone(), spec.name.clone());
        let mut pods = self.lock_pods();
        if pods.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: "pod",
                name: spec.name.clone(),
            });
        }
        let status = PodStatus {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            phase: PodPhase::Pending,
            ready: false,
            image: Some(spec.image.clone()),
            labels: spec.labels.clone(),
            created_at: Some(chrono::Utc::now()),
        };
        pods.insert(key, FakePod {
            status: status.clone(),
            polls: 0,
        });
        Ok(status)
    }

    async fn delete_pod(
        &self,
        name: &str,
        namespace: &str,
        _mode: DeleteMode,
    ) -> Result<(), ClusterError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref make) = self.delete_error {
            return Err(make());
        }
        match self
            .lock_pods()
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(ClusterError::pod_not_found(name)),
        }
    }

    async fn get_pod(&self, name: &str, namespace: &str) -> Result<PodStatus, ClusterError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut pods = self.lock_pods();
        let pod = pods
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::pod_not_found(name))?;
        pod.polls += 1;
        if let Some(phase) = self.terminal_phase {
            pod.status.phase = phase;
        } else if self.ready_after_polls.is_some_and(|n| pod.polls >= n) {
            pod.status.phase = PodPhase::Running;
            pod.status.ready = true;
        }
        Ok(pod.status.clone())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodStatus>, ClusterError> {
        let mut pods: Vec<PodStatus> = self
            .lock_pods()
            .values()
            .filter(|p| p.status.namespace == namespace)
            .map(|p| p.status.clone())
            .collect();
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pods)
    }

    async fn pod_logs(&self, name: &str, namespace: &str) -> Result<String, ClusterError> {
        if self.has_pod(name, namespace) {
            Ok(format!("logs of {name}\n"))
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
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if !self.has_pod(name, namespace) {
            return Err(ClusterError::pod_not_found(name));
        }
        self.exec_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.command.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match (self.exec_handler)(&request) {
            FakeExec::Output {
                stdout,
                stderr,
                exit_code,
            } => Ok(ExecSession::new(
                reader(stdout),
                reader(stderr),
                async move { Ok(exit_code) }.boxed(),
            )),
            FakeExec::Broken { error, stderr } => Ok(ExecSession::new(
                reader(String::new()),
                reader(stderr),
                async move { Err(ClusterError::Transport(error)) }.boxed(),
            )),
            FakeExec::Refused(message) => Err(ClusterError::Transport(message)),
            FakeExec::Hang => Ok(ExecSession::new(
                reader(String::new()),
                reader(String::new()),
                futures::future::pending().boxed(),
            )),
        }
    }
}
