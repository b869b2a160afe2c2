#![deny(missing_docs)]
//! Execution backends for panelkit panels.
//!
//! The [`Runner`] trait is the dispatch seam of the engine: "execute
//! this panel content against this target and give me rows." It is
//! operation-defined, not mechanism-defined — the in-process
//! implementation is a function call into a registered driver, the
//! subprocess implementation is a round trip to a pooled external
//! worker, and calling code cannot tell which is behind the trait.
//!
//! That symmetry is the component's core invariant: for a fixed target
//! and fixed content, every mode returns the identical row sequence.

use async_trait::async_trait;
use panelkit_connector::ExecutionTarget;
use panelkit_types::{EvalError, Row, RunnerMode};
use tokio_util::sync::CancellationToken;

pub mod driver;
pub mod inprocess;
pub mod protocol;
pub mod subprocess;

pub use driver::{ConnectorDriver, DriverRegistry};
pub use inprocess::InProcessRunner;
pub use subprocess::SubprocessRunner;

/// The execution backend that carries out a panel's content against its
/// connector.
///
/// Implementations must honor the cancellation token: return
/// [`EvalError::Cancelled`] promptly, releasing whatever resources the
/// dispatch held. They must never log or embed credentials in errors.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Which mode this runner implements, for mode checks and logs.
    fn mode(&self) -> RunnerMode;

    /// Execute the content against the target and collect the rows.
    async fn evaluate(
        &self,
        target: &ExecutionTarget,
        content: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<Row>, EvalError>;
}
