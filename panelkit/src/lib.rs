#![deny(missing_docs)]
//! # panelkit — umbrella crate
//!
//! Single import surface for the panel evaluation engine. Re-exports
//! the member crates behind feature flags, plus a `prelude` for the
//! happy path: build a vault, register connectors and drivers, create
//! an [`Evaluator`](panelkit_eval::Evaluator), evaluate projects.

#[cfg(feature = "connector")]
pub use panelkit_connector;
#[cfg(feature = "engine")]
pub use panelkit_eval;
#[cfg(feature = "runner")]
pub use panelkit_runner;
#[cfg(feature = "store")]
pub use panelkit_store;
#[cfg(feature = "core")]
pub use panelkit_types;
#[cfg(feature = "vault")]
pub use panelkit_vault;

/// Happy-path imports for wiring up the engine.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use panelkit_types::{
        ConnectorId, ConnectorInfo, ConnectorKind, EncryptedSecret, ErrorKind, EvalError,
        FatalError, Panel, PanelError, PanelId, PanelKind, PanelStatus, Project, ProjectId,
        ResultRecord, Row, RunnerDescriptor, RunnerMode,
    };

    #[cfg(feature = "vault")]
    pub use panelkit_vault::{MasterKey, Vault};

    #[cfg(feature = "connector")]
    pub use panelkit_connector::{ConnectorCapabilities, ConnectorRegistry, ExecutionTarget};

    #[cfg(feature = "store")]
    pub use panelkit_store::ResultStore;

    #[cfg(feature = "runner")]
    pub use panelkit_runner::{ConnectorDriver, DriverRegistry, Runner};

    #[cfg(feature = "engine")]
    pub use panelkit_eval::{EvalOptions, EvalReport, Evaluator, PanelSelection};
}
