#![deny(missing_docs)]
//! Connector resolution and capabilities for panelkit.
//!
//! Three pieces:
//!
//! - [`ConnectorRegistry`] resolves connector ids to
//!   [`ConnectorInfo`](panelkit_types::ConnectorInfo) values.
//! - [`ConnectorCapabilities`] is the shared interface every kind
//!   implements: validate required fields, normalize port defaults, and
//!   declare which runner modes it supports.
//! - [`build_execution_target`] turns a connector plus a decrypted
//!   credential into the opaque [`ExecutionTarget`] a runner consumes.

pub mod capability;
pub mod registry;
pub mod target;

pub use capability::{ConnectorCapabilities, build_execution_target, ensure_mode};
pub use registry::ConnectorRegistry;
pub use target::{ExecutionTarget, InlineCredential};

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_types::{ConnectorId, ConnectorInfo, ConnectorKind, EncryptedSecret};
    use panelkit_vault::{MasterKey, Vault};

    /// End to end: decrypt with the vault inside a scoped closure and
    /// build a target, the way the orchestrator does it.
    #[test]
    fn vault_scoped_target_construction() {
        let vault = Vault::new(MasterKey::from_bytes([1u8; 32]));
        let info = ConnectorInfo {
            id: ConnectorId::new("c1"),
            name: "ch".into(),
            kind: ConnectorKind::Clickhouse { port: None },
            address: "localhost".into(),
            username: "test".into(),
            password: vault.encrypt("hunter2").unwrap(),
            database: None,
        };

        let decrypted = vault.decrypt(&info.password).unwrap();
        let target = decrypted
            .with_str(|pw| build_execution_target(&info, pw))
            .unwrap();
        target.password.with_str(|pw| assert_eq!(pw, "hunter2"));
        assert_eq!(target.port, Some(8123));
    }
}
