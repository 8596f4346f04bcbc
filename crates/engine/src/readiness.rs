//! Bounded readiness polling.

use std::time::Duration;

use {
    tokio::time::Instant,
    tracing::{debug, trace},
};

use crate::{
    cluster::{ClusterClient, PodStatus},
    error::{Result, SandboxError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(2),
        }
    }
}

/// Poll the pod backing sandbox `name` until its `Ready` condition is true.
///
/// Every status call is bounded by the deadline, so this returns no later than
/// `policy.timeout` after it starts. A pod that reaches a terminal phase
/// before becoming ready fails immediately.
pub async fn wait_ready(
    client: &dyn ClusterClient,
    name: &str,
    pod: &str,
    namespace: &str,
    policy: ReadinessPolicy,
) -> Result<PodStatus> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let timed_out = || SandboxError::ReadinessTimeout {
        name: name.to_string(),
        pod: pod.to_string(),
        timeout: policy.timeout,
    };

    let mut polls = 0u32;
    loop {
        polls += 1;
        let status = match tokio::time::timeout_at(deadline, client.get_pod(pod, namespace)).await {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(SandboxError::Status {
                    pod: pod.to_string(),
                    source,
                });
            },
            Err(_) => return Err(timed_out()),
        };
        trace!(pod, polls, phase = %status.phase, ready = status.ready, "readiness poll");

        if status.ready {
            debug!(
                pod,
                polls,
                waited_ms = started.elapsed().as_millis() as u64,
                "pod ready"
            );
            return Ok(status);
        }
        if status.phase.is_terminal() {
            return Err(SandboxError::ProvisioningFailed {
                pod: pod.to_string(),
                phase: status.phase,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out());
        }
        tokio::time::sleep(policy.interval.min(deadline - now)).await;
    }
}
