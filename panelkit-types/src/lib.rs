//! # panelkit-types — vocabulary for the panel evaluation engine
//!
//! This crate defines the data types shared by every panelkit crate:
//! the project/panel model, connector descriptions, the encrypted-secret
//! shape, runner selection, the uniform result record, and the error
//! taxonomy.
//!
//! These are data types only. Behavior lives in the implementation
//! crates: `panelkit-vault` (encryption), `panelkit-connector`
//! (capabilities), `panelkit-runner` (dispatch), `panelkit-store`
//! (persistence), and `panelkit-eval` (orchestration). This crate defines
//! the vocabulary; higher layers define the behavior.

#![deny(missing_docs)]

pub mod connector;
pub mod error;
pub mod id;
pub mod project;
pub mod result;
pub mod runner;
pub mod secret;

// Re-exports for convenience
pub use connector::{ConnectorInfo, ConnectorKind};
pub use error::{ErrorKind, EvalError, FatalError, PanelError, StoreError};
pub use id::{ConnectorId, PanelId, ProjectId};
pub use project::{Panel, PanelKind, PanelStatus, Project, ResultMeta};
pub use result::{ResultRecord, Row};
pub use runner::{RunnerDescriptor, RunnerMode};
pub use secret::EncryptedSecret;
