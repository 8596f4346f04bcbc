//! Draining remote exec sessions.
//!
//! Both output channels are read concurrently in fixed-size chunks until EOF.
//! A broken channel is a transport failure: partial output is never returned
//! as a result. When the session itself fails, whatever the remote wrote to
//! stderr is appended to the error message.

use std::time::Duration;

use {
    thiserror::Error,
    tokio::io::{AsyncRead, AsyncReadExt},
    tracing::debug,
};

use crate::cluster::{ClusterClient, ExecRequest, ExecSession};

/// Size of a single read from an exec channel.
pub const READ_CHUNK_SIZE: usize = 2048;

/// Everything a finished remote command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{0}")]
    Transport(String),

    #[error("exec timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// Read `reader` to EOF in [`READ_CHUNK_SIZE`] pieces.
pub async fn read_chunked<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
) -> std::io::Result<Vec<u8>> {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut out = Vec::new();
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// Drain both channels of `session`, then wait for the remote exit code.
pub async fn drain(session: ExecSession) -> Result<StreamOutput, StreamError> {
    let ExecSession {
        mut stdout,
        mut stderr,
        completion,
    } = session;

    let (out, err) = tokio::join!(read_chunked(&mut stdout), read_chunked(&mut stderr));

    let stderr = match err {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => return Err(StreamError::Transport(format!("stderr stream broken: {e}"))),
    };
    let stdout = match out {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            return Err(with_stderr(format!("stdout stream broken: {e}"), &stderr));
        },
    };

    match completion.await {
        Ok(exit_code) => {
            debug!(
                exit_code,
                stdout_len = stdout.len(),
                stderr_len = stderr.len(),
                "exec stream drained"
            );
            Ok(StreamOutput {
                stdout,
                stderr,
                exit_code,
            })
        },
        Err(e) => Err(with_stderr(e.to_string(), &stderr)),
    }
}

fn with_stderr(message: String, stderr: &str) -> StreamError {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        StreamError::Transport(message)
    } else {
        StreamError::Transport(format!("{message}, stderr: {stderr}"))
    }
}

/// Start `request` in the pod and drain it, bounded by `timeout`.
///
/// On timeout the session is dropped, which tears down the transport.
pub async fn execute(
    client: &dyn ClusterClient,
    pod: &str,
    namespace: &str,
    request: ExecRequest,
    timeout: Option<Duration>,
) -> Result<StreamOutput, StreamError> {
    let run = async {
        let session = client
            .exec(pod, namespace, request)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        drain(session).await
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| StreamError::TimedOut(limit))?,
        None => run.await,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use {futures::FutureExt, tokio_test::io::Builder};

    use {super::*, crate::error::ClusterError};

    fn session(
        stdout: impl AsyncRead + Send + Unpin + 'static,
        stderr: impl AsyncRead + Send + Unpin + 'static,
        completion: Result<i32, ClusterError>,
    ) -> ExecSession {
        ExecSession::new(
            Box::new(stdout),
            Box::new(stderr),
            async move { completion }.boxed(),
        )
    }

    #[tokio::test]
    async fn test_accumulates_partial_reads() {
        let stdout = Builder::new()
            .read(b"hel")
            .read(b"lo ")
            .read(b"world\n")
            .build();
        let out = drain(session(stdout, Cursor::new(Vec::new()), Ok(0)))
            .await
            .unwrap();
        assert_eq!(out.stdout, "hello world\n");
        assert_eq!(out.stderr, "");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_output_larger_than_one_chunk() {
        let payload = "x".repeat(READ_CHUNK_SIZE * 3 + 17);
        let out = drain(session(
            Cursor::new(payload.clone().into_bytes()),
            Cursor::new(b"warn\n".to_vec()),
            Ok(3),
        ))
        .await
        .unwrap();
        assert_eq!(out.stdout.len(), payload.len());
        assert_eq!(out.stderr, "warn\n");
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_broken_stdout_is_transport_error() {
        let stdout = Builder::new()
            .read(b"partial")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
            .build();
        let err = drain(session(stdout, Cursor::new(b"oops".to_vec()), Ok(0)))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("stdout stream broken"), "{msg}");
        assert!(msg.contains("connection reset"), "{msg}");
        assert!(msg.contains("stderr: oops"), "{msg}");
        assert!(!msg.contains("partial"));
    }

    #[tokio::test]
    async fn test_completion_failure_carries_stderr() {
        let err = drain(session(
            Cursor::new(Vec::new()),
            Cursor::new(b"error: unable to upgrade connection\n".to_vec()),
            Err(ClusterError::Transport("exec failed".into())),
        ))
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "exec failed, stderr: error: unable to upgrade connection"
        );
    }

    #[tokio::test]
    async fn test_completion_failure_without_stderr() {
        let err = drain(session(
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
            Err(ClusterError::Transport("websocket closed".into())),
        ))
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "websocket closed");
    }

    #[tokio::test]
    async fn test_read_chunked_empty() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        assert!(read_chunked(&mut reader).await.unwrap().is_empty());
    }
}
