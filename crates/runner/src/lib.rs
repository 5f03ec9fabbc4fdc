//! Supervisor for the long-running processes of one binary.
//!
//! Every registered process runs concurrently on its own task. The first
//! process to fail (or panic), or a SIGINT/SIGTERM, cancels the shared token;
//! the runner then waits for the remaining processes, runs the closers under a
//! timeout, and reports how the run ended so `main` can choose an exit code.
//!
//! ```no_run
//! use ember_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let outcome = Runner::new()
//!         .with_named_process(
//!             "ticker",
//!             Box::new(|ctx| {
//!                 Box::pin(async move {
//!                     ctx.cancelled().await;
//!                     Ok::<(), anyhow::Error>(())
//!                 })
//!             }),
//!         )
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A process body: receives the shared cancellation token and runs until it
/// is cancelled or fails.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Cleanup run once after every process has stopped.
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Stopped by a signal or external cancellation, or every process returned `Ok`.
    Clean,
    /// A process failed or panicked; carries its name and error.
    Failed { process: String, error: anyhow::Error },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Failed { .. } => 1,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::Clean)
    }
}

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
    /// Closer timeout defaults to 10 seconds.
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Register a process under a name used in logs and in `RunOutcome::Failed`.
    pub fn with_named_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push((name.into(), process));
        self
    }

    /// Closers run after all processes have stopped, whatever the reason.
    /// A failing closer does not prevent the others from running.
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

    /// Use an externally owned token, e.g. to stop the runner from a test.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub async fn run(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.processes {
            let process_token = token.clone();
            info!(process = %name, "starting process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        let signals = tokio::spawn(wait_for_shutdown_signal(token.clone()));

        let mut outcome = RunOutcome::Clean;
        loop {
            let joined = tokio::select! {
                _ = token.cancelled() => break,
                joined = join_set.join_next() => joined,
            };

            match joined {
                None => break,
                Some(Ok((name, Ok(())))) => {
                    debug!(process = %name, "process completed");
                }
                Some(Ok((name, Err(err)))) => {
                    error!(process = %name, "process failed: {err:#}");
                    outcome = RunOutcome::Failed {
                        process: name,
                        error: err,
                    };
                    token.cancel();
                    break;
                }
                Some(Err(err)) => {
                    error!("process panicked: {err}");
                    outcome = RunOutcome::Failed {
                        process: "unknown".to_string(),
                        error: anyhow::anyhow!("process panicked: {err}"),
                    };
                    token.cancel();
                    break;
                }
            }
        }

        // Processes observe the token; give them the closer budget to wind down.
        token.cancel();
        if tokio::time::timeout(self.closer_timeout, drain(&mut join_set))
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.closer_timeout,
                "processes did not stop in time, aborting"
            );
            join_set.shutdown().await;
        }
        signals.abort();

        if !self.closers.is_empty() {
            info!(timeout = ?self.closer_timeout, "running closers");
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("all closers completed"),
                Err(_) => error!(timeout = ?self.closer_timeout, "closers timed out"),
            }
        }

        match &outcome {
            RunOutcome::Clean => info!("exiting normally"),
            RunOutcome::Failed { process, error } => {
                error!(process = %process, "exiting with error: {error:#}")
            }
        }
        outcome
    }
}

async fn drain(join_set: &mut JoinSet<(String, anyhow::Result<()>)>) {
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, Ok(()))) => debug!(process = %name, "process stopped"),
            Ok((name, Err(err))) => warn!(process = %name, "process failed while stopping: {err:#}"),
            Err(err) => warn!("process panicked while stopping: {err}"),
        }
    }
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(joined) = closer_set.join_next().await {
        match joined {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(err)) => error!("closer error: {err:#}"),
            Err(err) => error!("closer panicked: {err}"),
        }
    }
}

async fn wait_for_shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            error!("failed to listen for ctrl-c: {err}");
                            return;
                        }
                        info!("received SIGINT");
                    }
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
                token.cancel();
                return;
            }
            Err(err) => error!("failed to install SIGTERM handler: {err}"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received SIGINT");
            token.cancel();
        }
        Err(err) => error!("failed to listen for ctrl-c: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn until_cancelled(stopped: Arc<AtomicUsize>) -> AppProcess {
        Box::new(move |ctx| {
            Box::pin(async move {
                ctx.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_external_cancellation_is_clean_and_runs_closers() {
        // Arrange
        let stopped = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let closed_flag = Arc::clone(&closed);
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_named_process("a", until_cancelled(Arc::clone(&stopped)))
            .with_named_process("b", until_cancelled(Arc::clone(&stopped)))
            .with_closer(move || async move {
                closed_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .with_cancellation_token(token.clone())
            .with_closer_timeout(Duration::from_secs(5));

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        // Act
        let outcome = runner.run().await;

        // Assert
        assert!(outcome.is_clean());
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(stopped.load(Ordering::SeqCst), 2);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_the_rest() {
        let stopped = Arc::new(AtomicUsize::new(0));

        let outcome = Runner::new()
            .with_named_process("healthy", until_cancelled(Arc::clone(&stopped)))
            .with_named_process(
                "broken",
                Box::new(|_ctx| {
                    Box::pin(async { Err::<(), _>(anyhow::anyhow!("bus connection lost")) })
                }),
            )
            .with_closer_timeout(Duration::from_secs(5))
            .run()
            .await;

        match &outcome {
            RunOutcome::Failed { process, error } => {
                assert_eq!(process, "broken");
                assert!(error.to_string().contains("bus connection lost"));
            }
            RunOutcome::Clean => panic!("expected failure"),
        }
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_closer_does_not_block_others() {
        let ran = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&ran);
        let second = Arc::clone(&ran);

        let outcome = Runner::new()
            .with_closer(move || async move {
                first.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("flush failed"))
            })
            .with_closer(move || async move {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run()
            .await;

        assert!(outcome.is_clean());
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }
}
