//! Runner selection — which execution backend carries out a panel.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a panel's content is executed against its connector.
///
/// Mode is an execution-time choice, not a semantic one: both modes
/// return the identical row shape for the same content and connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerMode {
    /// The engine performs the connector I/O itself.
    InProcess,
    /// A spawned external worker performs the connector I/O.
    Subprocess,
}

impl RunnerMode {
    /// Stable tag for logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            RunnerMode::InProcess => "in_process",
            RunnerMode::Subprocess => "subprocess",
        }
    }
}

/// Describes the execution backend for one evaluation run.
///
/// Configuration, not persisted per-project; supplied by the evaluation
/// caller ("use the in-process evaluator" or "use the go-runtime worker").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    /// Human-readable name, e.g. `"memory"` or `"go-worker"`.
    pub name: String,
    /// In-process or subprocess execution.
    pub mode: RunnerMode,
    /// Which external worker implementation (informational; subprocess
    /// mode only).
    pub runtime: Option<String>,
    /// Path to the worker binary (required for subprocess mode).
    pub binary: Option<PathBuf>,
    /// Extra arguments passed to the worker binary.
    pub args: Vec<String>,
    /// Upper bound on concurrently live worker processes.
    pub pool_size: usize,
}

impl RunnerDescriptor {
    /// The in-process evaluator.
    pub fn in_process() -> Self {
        Self {
            name: "memory".into(),
            mode: RunnerMode::InProcess,
            runtime: None,
            binary: None,
            args: vec![],
            pool_size: 0,
        }
    }

    /// A subprocess runner backed by the given worker binary.
    pub fn subprocess(name: impl Into<String>, binary: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mode: RunnerMode::Subprocess,
            runtime: None,
            binary: Some(binary.into()),
            args: vec![],
            pool_size: 4,
        }
    }

    /// Builder-style argument list for the worker binary.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_process_descriptor_has_no_binary() {
        let desc = RunnerDescriptor::in_process();
        assert_eq!(desc.mode, RunnerMode::InProcess);
        assert!(desc.binary.is_none());
    }

    #[test]
    fn subprocess_descriptor_carries_binary_and_pool() {
        let desc = RunnerDescriptor::subprocess("go-worker", "/usr/bin/panel-worker");
        assert_eq!(desc.mode, RunnerMode::Subprocess);
        assert_eq!(
            desc.binary.as_deref(),
            Some(std::path::Path::new("/usr/bin/panel-worker"))
        );
        assert!(desc.pool_size > 0);
    }

    #[test]
    fn mode_tags() {
        assert_eq!(RunnerMode::InProcess.as_str(), "in_process");
        assert_eq!(RunnerMode::Subprocess.as_str(), "subprocess");
    }
}
