//! Error types for each engine boundary.
//!
//! Every failure that can happen to a single panel is an [`EvalError`];
//! the orchestrator captures it at panel granularity, records it in the
//! panel's status, and persists its serializable face ([`PanelError`])
//! via the result store. Only [`FatalError`] escapes the project-level
//! evaluation call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{ConnectorId, PanelId};

/// Panel evaluation errors. Captured per panel, never fatal to the run.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EvalError {
    /// Credential decryption failed or the data source rejected the
    /// credentials. Distinct from [`EvalError::Connection`] so a bad
    /// vault key is never mistaken for a network problem.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The data source could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The data source rejected the panel content.
    #[error("query failed: {0}")]
    Query(String),

    /// The per-panel deadline elapsed before the dispatch finished.
    #[error("evaluation timed out after {0}ms")]
    Timeout(u64),

    /// The external worker exited abnormally or violated the wire protocol.
    #[error("runner crashed: {0}")]
    RunnerCrash(String),

    /// The panel references another panel with no result in this run and
    /// no persisted result from an earlier run.
    #[error("unresolved dependency on panel {0}")]
    UnresolvedDependency(PanelId),

    /// An upstream panel failed, so this panel was never dispatched.
    #[error("dependency {0} failed")]
    DependencyFailed(PanelId),

    /// The connector kind does not support the selected runner mode.
    #[error("connector kind {kind} does not support {mode} execution")]
    UnsupportedMode {
        /// Connector kind tag.
        kind: String,
        /// The rejected mode, as a tag ("in_process" or "subprocess").
        mode: &'static str,
    },

    /// An unknown connector or panel reference.
    #[error("connector not found: {0}")]
    NotFound(ConnectorId),

    /// The panel sits on or downstream of a dependency cycle.
    #[error("dependency cycle involving panel {0}")]
    CyclicDependency(PanelId),

    /// The dispatch was cancelled cooperatively. Maps to the `Cancelled`
    /// status, never persisted as a result-file error.
    #[error("evaluation cancelled")]
    Cancelled,

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result store errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem write or rename failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A filesystem read failed.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Serialization or deserialization of a result file failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Programming-contract violations. These are the only errors the
/// project-level `evaluate` call itself returns.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum FatalError {
    /// The RunnerDescriptor is malformed (e.g. subprocess mode with no
    /// binary path, or an unknown runtime identifier).
    #[error("malformed runner descriptor: {0}")]
    BadRunnerDescriptor(String),

    /// The vault master key was never installed but a connector needs
    /// credential decryption.
    #[error("vault master key missing")]
    MissingMasterKey,
}

/// Stable snake_case tag for each evaluation error kind.
///
/// This is the public face of the taxonomy: it appears in persisted
/// result files and in worker protocol error records, so external
/// readers can classify failures without parsing messages.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`EvalError::Auth`].
    Auth,
    /// See [`EvalError::Connection`].
    Connection,
    /// See [`EvalError::Query`].
    Query,
    /// See [`EvalError::Timeout`].
    Timeout,
    /// See [`EvalError::RunnerCrash`].
    RunnerCrash,
    /// See [`EvalError::UnresolvedDependency`].
    UnresolvedDependency,
    /// See [`EvalError::DependencyFailed`].
    DependencyFailed,
    /// See [`EvalError::UnsupportedMode`].
    UnsupportedMode,
    /// See [`EvalError::NotFound`].
    NotFound,
    /// See [`EvalError::CyclicDependency`].
    CyclicDependency,
    /// Anything that doesn't fit the taxonomy.
    Other,
}

/// A captured panel failure, as persisted in result files and carried
/// over the worker wire protocol.
///
/// The message is the underlying error text verbatim — minus credentials,
/// which never enter error payloads in the first place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelError {
    /// Which kind of failure this was.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl PanelError {
    /// Create a new panel error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&EvalError> for PanelError {
    fn from(e: &EvalError) -> Self {
        let kind = match e {
            EvalError::Auth(_) => ErrorKind::Auth,
            EvalError::Connection(_) => ErrorKind::Connection,
            EvalError::Query(_) => ErrorKind::Query,
            EvalError::Timeout(_) => ErrorKind::Timeout,
            EvalError::RunnerCrash(_) => ErrorKind::RunnerCrash,
            EvalError::UnresolvedDependency(_) => ErrorKind::UnresolvedDependency,
            EvalError::DependencyFailed(_) => ErrorKind::DependencyFailed,
            EvalError::UnsupportedMode { .. } => ErrorKind::UnsupportedMode,
            EvalError::NotFound(_) => ErrorKind::NotFound,
            EvalError::CyclicDependency(_) => ErrorKind::CyclicDependency,
            _ => ErrorKind::Other,
        };
        PanelError::new(kind, e.to_string())
    }
}

impl PanelError {
    /// Rebuild an [`EvalError`] from a wire/persisted record. Used when a
    /// worker reports a structured error back over the protocol.
    pub fn into_eval_error(self) -> EvalError {
        match self.kind {
            ErrorKind::Auth => EvalError::Auth(self.message),
            ErrorKind::Connection => EvalError::Connection(self.message),
            ErrorKind::Query => EvalError::Query(self.message),
            ErrorKind::Timeout => EvalError::Timeout(0),
            ErrorKind::RunnerCrash => EvalError::RunnerCrash(self.message),
            _ => EvalError::Other(self.message.into()),
        }
    }
}
