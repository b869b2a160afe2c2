//! Subprocess dispatch: an external worker performs the connector I/O.
//!
//! Workers are spawned from the binary named by the
//! [`RunnerDescriptor`], speak the NDJSON protocol of
//! [`crate::protocol`] over stdin/stdout, and are reused from a bounded
//! pool. Each worker moves through an explicit state machine — `Spawned
//! → Ready → Busy → Draining → Terminated` — with cancellation and
//! timeout acting as external signals into that machine rather than as
//! nested callbacks.
//!
//! Termination is cooperative: closing the worker's stdin asks it to
//! drain; after a bounded grace period the process is force-killed.
//! Workers are additionally spawned `kill_on_drop`, so an evaluation
//! future dropped mid-flight (the orchestrator's timeout path) never
//! leaks a process.

use async_trait::async_trait;
use panelkit_connector::ExecutionTarget;
use panelkit_types::{EvalError, FatalError, Row, RunnerDescriptor, RunnerMode};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Runner;
use crate::protocol::WorkerReply;

/// Lifecycle of one worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    /// Process launched, not yet handed a request.
    Spawned,
    /// Idle and healthy; may be handed a request.
    Ready,
    /// Serving exactly one evaluation.
    Busy,
    /// Asked to finish up (stdin closed), grace period running.
    Draining,
    /// Gone. The struct is dropped right after reaching this state.
    Terminated,
}

/// One worker process plus its protocol streams.
struct Worker {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    state: WorkerState,
}

impl Worker {
    async fn spawn(binary: &Path, args: &[String]) -> Result<Self, EvalError> {
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EvalError::RunnerCrash(format!("failed to spawn worker: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EvalError::RunnerCrash("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EvalError::RunnerCrash("worker stdout unavailable".into()))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            state: WorkerState::Spawned,
        })
    }

    /// Whether an idle worker can be handed another request.
    fn is_live(&mut self) -> bool {
        self.state == WorkerState::Ready && matches!(self.child.try_wait(), Ok(None))
    }

    /// Drain request (close stdin), bounded grace period, then force-kill.
    async fn shutdown(mut self, grace: Duration) {
        self.state = WorkerState::Draining;
        drop(self.stdin.take());
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("worker did not drain within grace period, killing");
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }
        self.state = WorkerState::Terminated;
        debug!("worker terminated");
    }
}

/// Request line as written to a worker's stdin. The owned mirror of this
/// shape lives in [`crate::protocol::WorkerRequest`]; the engine side
/// borrows to avoid cloning the credential.
#[derive(Serialize)]
struct WorkerRequestRef<'a> {
    connector: &'a ExecutionTarget,
    content: &'a str,
}

/// Bounded pool of reusable workers.
///
/// The semaphore caps live processes; the idle list holds workers
/// between evaluations. Acquisition is synchronized so no worker is ever
/// handed to two evaluations at once.
struct WorkerPool {
    binary: PathBuf,
    args: Vec<String>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Worker>>,
}

impl WorkerPool {
    async fn acquire(&self) -> Result<(OwnedSemaphorePermit, Worker), EvalError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EvalError::RunnerCrash("worker pool closed".into()))?;
        loop {
            let candidate = self.idle.lock().await.pop();
            match candidate {
                Some(mut worker) => {
                    if worker.is_live() {
                        return Ok((permit, worker));
                    }
                    // Stale worker (exited while idle): reap and keep looking.
                    worker.shutdown(Duration::ZERO).await
                }
                None => break,
            }
        }
        let mut worker = Worker::spawn(&self.binary, &self.args).await?;
        worker.state = WorkerState::Ready;
        debug!(binary = %self.binary.display(), "spawned worker");
        Ok((permit, worker))
    }

    async fn release(&self, worker: Worker) {
        self.idle.lock().await.push(worker);
    }
}

/// What went wrong mid-exchange, and whether the worker's stream state
/// can still be trusted for another request.
struct ExchangeFailure {
    error: EvalError,
    worker_reusable: bool,
}

fn fail(error: EvalError, worker_reusable: bool) -> ExchangeFailure {
    ExchangeFailure {
        error,
        worker_reusable,
    }
}

/// Executes panel content by delegating to a pooled external worker.
pub struct SubprocessRunner {
    name: String,
    pool: WorkerPool,
    grace: Duration,
}

impl SubprocessRunner {
    /// Build a runner from a subprocess descriptor.
    ///
    /// A descriptor without a binary path, or one naming a different
    /// mode, is a programming-contract violation and fatal.
    pub fn new(descriptor: &RunnerDescriptor) -> Result<Self, FatalError> {
        if descriptor.mode != RunnerMode::Subprocess {
            return Err(FatalError::BadRunnerDescriptor(format!(
                "runner {} is not a subprocess runner",
                descriptor.name
            )));
        }
        let binary = descriptor.binary.clone().ok_or_else(|| {
            FatalError::BadRunnerDescriptor(format!(
                "subprocess runner {} has no binary path",
                descriptor.name
            ))
        })?;
        Ok(Self {
            name: descriptor.name.clone(),
            pool: WorkerPool {
                binary,
                args: descriptor.args.clone(),
                permits: Arc::new(Semaphore::new(descriptor.pool_size.max(1))),
                idle: Mutex::new(vec![]),
            },
            grace: Duration::from_secs(2),
        })
    }

    /// Override the drain grace period before force-kill.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    async fn exchange(
        &self,
        worker: &mut Worker,
        line: String,
        cancel: CancellationToken,
    ) -> Result<Vec<Row>, ExchangeFailure> {
        let Some(stdin) = worker.stdin.as_mut() else {
            return Err(fail(
                EvalError::RunnerCrash("worker stdin already closed".into()),
                false,
            ));
        };
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            return Err(fail(
                EvalError::RunnerCrash(format!("worker write failed: {e}")),
                false,
            ));
        }

        let mut rows: Vec<Row> = vec![];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(fail(EvalError::Cancelled, false));
                }
                next = worker.stdout.next_line() => match next {
                    Ok(Some(line)) => match serde_json::from_str::<WorkerReply>(&line) {
                        Ok(WorkerReply::Row { data }) => rows.push(data),
                        Ok(WorkerReply::Done) => return Ok(rows),
                        // A structured terminal error: the worker finished
                        // the request and stays usable.
                        Ok(WorkerReply::Error { error }) => {
                            return Err(fail(error.into_eval_error(), true));
                        }
                        // Never echo the offending line; it is untrusted
                        // output on a channel that carried credentials.
                        Err(_) => {
                            return Err(fail(
                                EvalError::RunnerCrash(
                                    "worker emitted a malformed protocol record".into(),
                                ),
                                false,
                            ));
                        }
                    },
                    Ok(None) => {
                        let detail = match worker.child.wait().await {
                            Ok(status) => format!("worker exited: {status}"),
                            Err(e) => format!("worker wait failed: {e}"),
                        };
                        return Err(fail(EvalError::RunnerCrash(detail), false));
                    }
                    Err(e) => {
                        return Err(fail(
                            EvalError::RunnerCrash(format!("worker read failed: {e}")),
                            false,
                        ));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Runner for SubprocessRunner {
    fn mode(&self) -> RunnerMode {
        RunnerMode::Subprocess
    }

    async fn evaluate(
        &self,
        target: &ExecutionTarget,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<Row>, EvalError> {
        let line = serde_json::to_string(&WorkerRequestRef {
            connector: target,
            content,
        })
        .map_err(|e| EvalError::RunnerCrash(format!("request serialization failed: {e}")))?;

        let (permit, mut worker) = tokio::select! {
            _ = cancel.cancelled() => return Err(EvalError::Cancelled),
            acquired = self.pool.acquire() => acquired?,
        };
        worker.state = WorkerState::Busy;
        debug!(runner = %self.name, kind = %target.kind, "dispatching to worker");

        match self.exchange(&mut worker, line, cancel).await {
            Ok(rows) => {
                worker.state = WorkerState::Ready;
                self.pool.release(worker).await;
                drop(permit);
                Ok(rows)
            }
            Err(failure) => {
                if failure.worker_reusable {
                    worker.state = WorkerState::Ready;
                    self.pool.release(worker).await;
                } else {
                    worker.shutdown(self.grace).await;
                }
                drop(permit);
                Err(failure.error)
            }
        }
    }
}
