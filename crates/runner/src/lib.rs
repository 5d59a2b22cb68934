//! Concurrent application runner with graceful shutdown.
//!
//! Named long-running processes share a cancellation token; the first
//! process failure or a SIGTERM/ctrl-c cancels the rest. Closers run
//! afterwards under a timeout, whatever the outcome.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A long-running process: receives the shared cancellation token and runs
/// until cancelled or failed.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// A cleanup function executed after every process has stopped.
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

pub struct Runner {
    processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Register a named process. The name shows up in logs when the process
    /// stops or fails.
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push((name.into(), process));
        self
    }

    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally-owned cancellation token.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run every process to completion or shutdown, then the closers, then
    /// exit the process.
    pub async fn run(self) -> ! {
        let token = self.cancellation_token;
        let mut processes = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            processes.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        spawn_signal_handlers(token.clone());

        let mut first_error = None;
        while let Some(joined) = processes.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "process completed");
                }
                Ok((name, Err(e))) => {
                    tracing::error!(process = %name, error = %format!("{e:#}"), "process failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    token.cancel();
                }
                Err(e) => {
                    tracing::error!(error = %e, "process panicked");
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            tracing::info!(timeout = ?self.closer_timeout, "running closers");
            let closed =
                tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await;
            if closed.is_err() {
                tracing::error!(timeout = ?self.closer_timeout, "closers timed out");
            }
        }

        match first_error {
            Some(e) => {
                tracing::error!(error = %format!("{e:#}"), "exiting with error");
                std::process::exit(1);
            }
            None => {
                tracing::info!("exiting normally");
                std::process::exit(0);
            }
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt signal");
            ctrl_c_token.cancel();
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM");
                token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut set = JoinSet::new();
    for closer in closers {
        set.spawn(async move { closer().await });
    }
    while let Some(result) = set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(e)) => tracing::error!(error = %format!("{e:#}"), "closer failed"),
            Err(e) => tracing::error!(error = %e, "closer panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_closers_all_run() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));

        let runner = Runner::new()
            .with_closer({
                let flag = Arc::clone(&first);
                move || async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_closer({
                let flag = Arc::clone(&second);
                move || async move {
                    flag.store(true, Ordering::SeqCst);
                    anyhow::bail!("cleanup hiccup")
                }
            });

        // run() exits the process, so exercise the closer path directly
        run_closers(runner.closers).await;
        assert!(first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancellation_token_stops_process() {
        let token = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_clone = Arc::clone(&stopped);

        let token_clone = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token_clone.cancelled() => {
                    stopped_clone.store(true, Ordering::SeqCst);
                }
                _ = tokio::time::sleep(Duration::from_secs(60)) => {}
            }
        });

        token.cancel();
        handle.await.unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }
}
