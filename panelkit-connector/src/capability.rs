//! The shared capability interface every connector kind implements.
//!
//! A closed match over [`ConnectorKind`] variants, not trait objects:
//! new kinds are added as new match arms, never by subclassing. Each kind
//! answers the same three questions — are the required fields present,
//! what are the normalized address/port defaults, and which runner modes
//! does it support.

use panelkit_types::{ConnectorInfo, ConnectorKind, EvalError, RunnerMode};
use serde_json::Value;

use crate::target::{ExecutionTarget, InlineCredential};

const BOTH_MODES: &[RunnerMode] = &[RunnerMode::InProcess, RunnerMode::Subprocess];
const SUBPROCESS_ONLY: &[RunnerMode] = &[RunnerMode::Subprocess];

/// Capability interface over connector descriptions.
pub trait ConnectorCapabilities {
    /// Check that the fields this kind requires are present.
    fn validate(&self) -> Result<(), EvalError>;

    /// Fill in address/port defaults, returning the normalized value.
    fn normalized(self) -> Self;

    /// Which runner modes this kind can execute under.
    fn supported_modes(&self) -> &'static [RunnerMode];

    /// Whether the given mode is legal for this kind.
    fn supports(&self, mode: RunnerMode) -> bool {
        self.supported_modes().contains(&mode)
    }
}

/// Default port for a kind, if it has one.
fn default_port(kind: &ConnectorKind) -> Option<u16> {
    match kind {
        ConnectorKind::Clickhouse { .. } => Some(8123),
        ConnectorKind::Postgres { .. } => Some(5432),
        ConnectorKind::Mysql { .. } => Some(3306),
        ConnectorKind::Elasticsearch { .. } => Some(9200),
        ConnectorKind::Oracle { .. } => Some(1521),
        ConnectorKind::Sqlserver { .. } => Some(1433),
        ConnectorKind::Sqlite { .. }
        | ConnectorKind::Snowflake { .. }
        | ConnectorKind::Bigquery { .. } => None,
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn invalid(info: &ConnectorInfo, what: &str) -> EvalError {
    EvalError::Connection(format!("connector {}: {what}", info.id))
}

impl ConnectorCapabilities for ConnectorInfo {
    fn validate(&self) -> Result<(), EvalError> {
        match &self.kind {
            ConnectorKind::Sqlite { path } => {
                if path.is_empty() {
                    return Err(invalid(self, "sqlite requires a database file path"));
                }
            }
            ConnectorKind::Snowflake { account, .. } => {
                if account.is_empty() {
                    return Err(invalid(self, "snowflake requires an account identifier"));
                }
            }
            ConnectorKind::Bigquery { project } => {
                if project.is_empty() {
                    return Err(invalid(self, "bigquery requires a project id"));
                }
            }
            _ => {
                if self.address.is_empty() {
                    return Err(invalid(self, "address is required"));
                }
            }
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        let default = default_port(&self.kind);
        match &mut self.kind {
            ConnectorKind::Clickhouse { port }
            | ConnectorKind::Postgres { port, .. }
            | ConnectorKind::Mysql { port, .. }
            | ConnectorKind::Elasticsearch { port, .. }
            | ConnectorKind::Oracle { port, .. }
            | ConnectorKind::Sqlserver { port } => {
                if port.is_none() {
                    *port = default;
                }
            }
            _ => {}
        }
        self
    }

    fn supported_modes(&self) -> &'static [RunnerMode] {
        match &self.kind {
            // ODBC-backed kinds only exist inside external workers.
            ConnectorKind::Oracle { .. } | ConnectorKind::Sqlserver { .. } => SUBPROCESS_ONLY,
            _ => BOTH_MODES,
        }
    }
}

/// Reject a runner mode the connector kind cannot execute under.
///
/// Called by the orchestrator before any credential decryption or
/// dispatch happens.
pub fn ensure_mode(info: &ConnectorInfo, mode: RunnerMode) -> Result<(), EvalError> {
    if info.supports(mode) {
        Ok(())
    } else {
        Err(EvalError::UnsupportedMode {
            kind: info.kind.tag().to_owned(),
            mode: mode.as_str(),
        })
    }
}

/// Build the opaque execution target a runner uses to reach the source.
///
/// `password` is the decrypted credential; call this inside the vault's
/// scoped exposure so the plaintext never outlives the dispatch that
/// needs it.
pub fn build_execution_target(
    info: &ConnectorInfo,
    password: &str,
) -> Result<ExecutionTarget, EvalError> {
    info.validate()?;

    let mut params = serde_json::Map::new();
    let port = match &info.kind {
        ConnectorKind::Clickhouse { port }
        | ConnectorKind::Postgres { port, .. }
        | ConnectorKind::Mysql { port, .. }
        | ConnectorKind::Elasticsearch { port, .. }
        | ConnectorKind::Oracle { port, .. }
        | ConnectorKind::Sqlserver { port } => port.or_else(|| default_port(&info.kind)),
        _ => None,
    };
    let tls = matches!(
        info.kind,
        ConnectorKind::Postgres { tls: true, .. } | ConnectorKind::Mysql { tls: true, .. }
    );

    match &info.kind {
        ConnectorKind::Sqlite { path } => {
            params.insert("path".into(), Value::String(path.clone()));
        }
        ConnectorKind::Elasticsearch {
            index: Some(index), ..
        } => {
            params.insert("index".into(), Value::String(index.clone()));
        }
        ConnectorKind::Snowflake { account, warehouse } => {
            params.insert("account".into(), Value::String(account.clone()));
            if let Some(warehouse) = warehouse {
                params.insert("warehouse".into(), Value::String(warehouse.clone()));
            }
        }
        ConnectorKind::Bigquery { project } => {
            params.insert("project".into(), Value::String(project.clone()));
        }
        ConnectorKind::Oracle {
            service: Some(service),
            ..
        } => {
            params.insert("service".into(), Value::String(service.clone()));
        }
        _ => {}
    }

    Ok(ExecutionTarget {
        kind: info.kind.tag().to_owned(),
        address: info.address.clone(),
        port,
        database: info.database.clone(),
        username: info.username.clone(),
        password: InlineCredential::new(password),
        tls,
        params,
    })
}
