//! The wire protocol between the engine and an external worker.
//!
//! One request per line on the worker's stdin; newline-delimited JSON
//! records back on its stdout, so the engine can consume rows as they
//! stream. The request inlines the decrypted credentials — this message
//! is the only place they cross the process boundary, and it is never
//! written to disk. A response stream is terminated by a `done` record
//! or a single structured `error` record; anything else the worker
//! prints is a protocol violation.

use panelkit_connector::ExecutionTarget;
use panelkit_types::{PanelError, Row};
use serde::{Deserialize, Serialize};

/// One evaluation request, serialized as a single JSON line.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Connection parameters with credentials inlined.
    pub connector: ExecutionTarget,
    /// The panel content, forwarded verbatim.
    pub content: String,
}

/// One record of a worker's response stream.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerReply {
    /// One result row.
    Row {
        /// Column name to scalar value.
        data: Row,
    },
    /// Terminal record: the evaluation failed. The worker stays alive
    /// for the next request.
    Error {
        /// The structured failure. Must not echo credentials.
        error: PanelError,
    },
    /// Terminal record: all rows have been streamed.
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_types::ErrorKind;
    use serde_json::json;

    #[test]
    fn replies_parse_from_tagged_lines() {
        let reply: WorkerReply =
            serde_json::from_str(r#"{"kind":"row","data":{"number":42}}"#).unwrap();
        match reply {
            WorkerReply::Row { data } => assert_eq!(data["number"], json!(42)),
            other => panic!("unexpected reply: {other:?}"),
        }

        let reply: WorkerReply = serde_json::from_str(r#"{"kind":"done"}"#).unwrap();
        assert!(matches!(reply, WorkerReply::Done));

        let reply: WorkerReply = serde_json::from_str(
            r#"{"kind":"error","error":{"kind":"query","message":"bad sql"}}"#,
        )
        .unwrap();
        match reply {
            WorkerReply::Error { error } => {
                assert_eq!(error.kind, ErrorKind::Query);
                assert_eq!(error.message, "bad sql");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn garbage_lines_do_not_parse() {
        assert!(serde_json::from_str::<WorkerReply>("not json").is_err());
        assert!(serde_json::from_str::<WorkerReply>(r#"{"kind":"shrug"}"#).is_err());
    }

    #[test]
    fn request_debug_redacts_credentials() {
        let target: ExecutionTarget = serde_json::from_value(json!({
            "kind": "clickhouse",
            "address": "localhost",
            "port": 8123,
            "database": null,
            "username": "test",
            "password": "hunter2",
            "tls": false,
            "params": {}
        }))
        .unwrap();
        let request = WorkerRequest {
            connector: target,
            content: "SELECT 42 AS number".into(),
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn request_serializes_to_a_single_line() {
        let target: ExecutionTarget = serde_json::from_value(json!({
            "kind": "clickhouse",
            "address": "localhost",
            "port": 8123,
            "database": null,
            "username": "test",
            "password": "pw",
            "tls": false,
            "params": {}
        }))
        .unwrap();
        let request = WorkerRequest {
            connector: target,
            content: "SELECT 1".into(),
        };
        let line = serde_json::to_string(&request).unwrap();
        assert!(!line.contains('\n'));
        // Credentials are inlined on the wire, by contract.
        assert!(line.contains("\"password\":\"pw\""));
    }
}
