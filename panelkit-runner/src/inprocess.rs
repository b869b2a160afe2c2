//! In-process dispatch: the engine performs the connector I/O itself.

use async_trait::async_trait;
use panelkit_connector::ExecutionTarget;
use panelkit_types::{EvalError, Row, RunnerMode};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Runner;
use crate::driver::DriverRegistry;

/// Executes panel content synchronously within the calling evaluation
/// task, via the driver registered for the connector kind.
pub struct InProcessRunner {
    drivers: DriverRegistry,
}

impl InProcessRunner {
    /// Create a runner around a registry of leaf drivers.
    pub fn new(drivers: DriverRegistry) -> Self {
        Self { drivers }
    }
}

#[async_trait]
impl Runner for InProcessRunner {
    fn mode(&self) -> RunnerMode {
        RunnerMode::InProcess
    }

    async fn evaluate(
        &self,
        target: &ExecutionTarget,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<Row>, EvalError> {
        let driver = self.drivers.get(&target.kind).ok_or_else(|| {
            // The kind allows in-process execution, but this build has no
            // driver for it.
            EvalError::UnsupportedMode {
                kind: target.kind.clone(),
                mode: RunnerMode::InProcess.as_str(),
            }
        })?;

        debug!(kind = %target.kind, "dispatching in-process query");
        tokio::select! {
            // Dropping the driver future is a best-effort abort; the
            // underlying client library may not interrupt instantly.
            _ = cancel.cancelled() => Err(EvalError::Cancelled),
            result = driver.query(target, content) => result,
        }
    }
}
