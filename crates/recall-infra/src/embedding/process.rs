//! Supervision of the embedding service child process.
//!
//! The service is launched as `{program} {args..} {port}` and signals
//! readiness by printing its first non-empty line on stdout. After that a
//! supervisor task drains its output, waits for exit, and flips the shared
//! running flag so callers fail fast once the process is gone.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use recall_types::config::EmbeddingConfig;
use recall_types::error::EmbeddingError;

struct Supervisor {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle to the embedding service process.
pub struct EmbeddingProcess {
    program: String,
    args: Vec<String>,
    port: u16,
    startup_timeout: Duration,
    running: Arc<AtomicBool>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl EmbeddingProcess {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        port: u16,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            port,
            startup_timeout,
            running: Arc::new(AtomicBool::new(false)),
            supervisor: Mutex::new(None),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.port,
            config.startup_timeout(),
        )
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the process and wait for its readiness line.
    ///
    /// Returns immediately when the process is already running.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), EmbeddingError> {
        let mut supervisor = self.supervisor.lock().await;
        if self.is_running() {
            debug!(port = self.port, "embedding process already running");
            return Ok(());
        }
        // A previous process exited on its own; its supervisor has finished.
        if let Some(old) = supervisor.take() {
            old.stop.cancel();
            let _ = old.handle.await;
        }

        info!(program = %self.program, port = self.port, "starting embedding process");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(self.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EmbeddingError::Spawn(format!("{}: {e}", self.program)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EmbeddingError::Spawn("failed to capture stdout".to_string()))?;
        let stderr = child.stderr.take();
        let mut lines = BufReader::new(stdout).lines();

        let readiness = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(EmbeddingError::StartupCancelled),
            line = first_non_empty_line(&mut lines) => match line {
                Ok(Some(line)) => Ok(line),
                Ok(None) => Err(EmbeddingError::ExitedBeforeReady {
                    status: "stdout closed".to_string(),
                }),
                Err(e) => Err(EmbeddingError::ExitedBeforeReady {
                    status: format!("stdout unreadable: {e}"),
                }),
            },
            status = child.wait() => Err(EmbeddingError::ExitedBeforeReady {
                status: match status {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                },
            }),
            _ = tokio::time::sleep(self.startup_timeout) => Err(EmbeddingError::StartupTimeout {
                secs: self.startup_timeout.as_secs(),
            }),
        };

        let ready_line = match readiness {
            Ok(line) => line,
            Err(e) => {
                warn!(port = self.port, "embedding process failed to start: {e}");
                if let Err(kill_err) = child.kill().await {
                    warn!(port = self.port, "failed to kill embedding process: {kill_err}");
                }
                return Err(e);
            }
        };

        info!(port = self.port, ready = %ready_line, "embedding process ready");
        self.running.store(true, Ordering::SeqCst);

        let stop = CancellationToken::new();
        let handle = tokio::spawn(supervise(
            child,
            lines,
            stderr,
            stop.clone(),
            Arc::clone(&self.running),
        ));
        *supervisor = Some(Supervisor { stop, handle });
        Ok(())
    }

    /// Kill the process and wait for the supervisor to finish.
    pub async fn shutdown(&self) {
        let supervisor = self.supervisor.lock().await.take();
        if let Some(supervisor) = supervisor {
            supervisor.stop.cancel();
            if let Err(e) = supervisor.handle.await {
                warn!("embedding supervisor task failed: {e}");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for EmbeddingProcess {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.stop.cancel();
        }
    }
}

async fn first_non_empty_line<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
) -> std::io::Result<Option<String>> {
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
    Ok(None)
}

async fn supervise(
    mut child: Child,
    mut stdout: Lines<BufReader<ChildStdout>>,
    stderr: Option<ChildStderr>,
    stop: CancellationToken,
    running: Arc<AtomicBool>,
) {
    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(stream = "stderr", "{line}");
            }
        });
    }

    let mut stdout_open = true;
    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill embedding process: {e}");
                }
                debug!("embedding process stopped");
                break;
            }
            status = child.wait() => {
                match status {
                    Ok(status) => warn!(%status, "embedding process exited"),
                    Err(e) => warn!("failed to wait on embedding process: {e}"),
                }
                break;
            }
            line = stdout.next_line(), if stdout_open => match line {
                Ok(Some(line)) => debug!(stream = "stdout", "{line}"),
                _ => stdout_open = false,
            },
        }
    }

    running.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str, timeout: Duration) -> EmbeddingProcess {
        // The port lands in $1.
        EmbeddingProcess::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "embedder".to_string()],
            8600,
            timeout,
        )
    }

    #[tokio::test]
    async fn test_start_waits_for_first_line() {
        let process = shell("echo; echo \"listening on $1\"; sleep 30", Duration::from_secs(5));
        assert!(!process.is_running());

        process.start(&CancellationToken::new()).await.unwrap();
        assert!(process.is_running());

        // Second start is a no-op
        process.start(&CancellationToken::new()).await.unwrap();

        process.shutdown().await;
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_start_times_out() {
        let process = shell("sleep 30", Duration::from_millis(200));
        let err = process.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::StartupTimeout { .. }));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_start_can_be_cancelled() {
        let process = shell("sleep 30", Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = process.start(&cancel).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::StartupCancelled));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_exit_before_ready() {
        let process = shell("exit 3", Duration::from_secs(5));
        let err = process.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ExitedBeforeReady { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let process = EmbeddingProcess::new(
            "/nonexistent/embedding-service",
            vec![],
            8600,
            Duration::from_secs(1),
        );
        let err = process.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_exit_after_ready_clears_running() {
        let process = shell("echo ready; sleep 0.2", Duration::from_secs(5));
        process.start(&CancellationToken::new()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while process.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!process.is_running());

        // A fresh start relaunches it
        process.start(&CancellationToken::new()).await.unwrap();
        assert!(process.is_running());
        process.shutdown().await;
    }
}
