//! The opaque value a runner uses to reach a data source.
//!
//! An [`ExecutionTarget`] is built from a validated, normalized
//! [`ConnectorInfo`](panelkit_types::ConnectorInfo) plus the decrypted
//! password, at the last moment before dispatch. It is the one place a
//! plaintext credential crosses a boundary: serialized into the worker
//! request message for subprocess runners, read in place by in-process
//! drivers. It is never written to disk.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

/// A credential inlined into a worker request.
///
/// Serializes as a plain string — that is its purpose: the subprocess
/// protocol carries decrypted credentials in the request message only.
/// Everything else is locked down: Debug prints `[REDACTED]`, there is
/// no Display, and the memory is zeroed on drop.
pub struct InlineCredential(Zeroizing<String>);

impl InlineCredential {
    /// Wrap a decrypted credential.
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(Zeroizing::new(plaintext.into()))
    }

    /// Scoped exposure of the credential, for in-process drivers that are
    /// themselves the point of use.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(&self.0)
    }
}

impl std::fmt::Debug for InlineCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for InlineCredential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for InlineCredential {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(Zeroizing::new(s)))
    }
}

/// Flat connection parameters for one dispatch.
///
/// Kind-specific settings that don't fit the common fields (sqlite path,
/// snowflake account, bigquery project, ...) travel in `params`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionTarget {
    /// Connector kind tag (`"clickhouse"`, `"postgres"`, ...).
    pub kind: String,
    /// Host name or address.
    pub address: String,
    /// Port, after defaulting. None for file-backed and cloud kinds.
    pub port: Option<u16>,
    /// Database/schema name, where the kind has one.
    pub database: Option<String>,
    /// Login user.
    pub username: String,
    /// Decrypted login password.
    pub password: InlineCredential,
    /// Whether the session requires TLS.
    pub tls: bool,
    /// Kind-specific extras.
    pub params: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> ExecutionTarget {
        ExecutionTarget {
            kind: "postgres".into(),
            address: "localhost".into(),
            port: Some(5432),
            database: Some("analytics".into()),
            username: "app".into(),
            password: InlineCredential::new("hunter2"),
            tls: false,
            params: serde_json::Map::new(),
        }
    }

    #[test]
    fn debug_redacts_credential() {
        let rendered = format!("{:?}", target());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn serializes_credential_for_the_wire() {
        // Inlining the plaintext is the wire contract; the caller must
        // only ever send this to a worker's stdin.
        let json = serde_json::to_value(target()).unwrap();
        assert_eq!(json["password"], "hunter2");
        assert_eq!(json["kind"], "postgres");
    }

    #[test]
    fn deserializes_from_wire_shape() {
        let json = json!({
            "kind": "clickhouse",
            "address": "localhost",
            "port": 8123,
            "database": null,
            "username": "test",
            "password": "pw",
            "tls": false,
            "params": {}
        });
        let target: ExecutionTarget = serde_json::from_value(json).unwrap();
        target.password.with_str(|s| assert_eq!(s, "pw"));
        assert_eq!(target.port, Some(8123));
    }
}
