//! Connector description — how to reach a specific data source instance.
//!
//! These are data types only. The capability interface (validate,
//! normalize, supported modes, execution-target construction) lives in
//! `panelkit-connector`; this crate defines the vocabulary.

use serde::{Deserialize, Serialize};

use crate::id::ConnectorId;
use crate::secret::EncryptedSecret;

/// Which database a connector reaches, plus kind-specific settings.
///
/// A closed set of tagged variants — new kinds are added as new variants,
/// never by extending an existing one. Kind-specific fields live on the
/// variant; fields shared by every kind live on [`ConnectorInfo`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorKind {
    /// ClickHouse over its HTTP interface.
    Clickhouse {
        /// Port override (default 8123).
        port: Option<u16>,
    },
    /// PostgreSQL.
    Postgres {
        /// Port override (default 5432).
        port: Option<u16>,
        /// Require TLS for the session.
        tls: bool,
    },
    /// MySQL / MariaDB.
    Mysql {
        /// Port override (default 3306).
        port: Option<u16>,
        /// Require TLS for the session.
        tls: bool,
    },
    /// SQLite. The database is a local file; address is unused.
    Sqlite {
        /// Path to the database file.
        path: String,
    },
    /// Elasticsearch.
    Elasticsearch {
        /// Port override (default 9200).
        port: Option<u16>,
        /// Default index to query.
        index: Option<String>,
    },
    /// Snowflake.
    Snowflake {
        /// Account identifier (e.g. `xy12345.eu-west-1`).
        account: String,
        /// Warehouse to run in.
        warehouse: Option<String>,
    },
    /// Google BigQuery.
    Bigquery {
        /// GCP project id billed for the query.
        project: String,
    },
    /// Oracle, reached via ODBC in an external worker.
    Oracle {
        /// Port override (default 1521).
        port: Option<u16>,
        /// Service name.
        service: Option<String>,
    },
    /// SQL Server, reached via ODBC in an external worker.
    Sqlserver {
        /// Port override (default 1433).
        port: Option<u16>,
    },
}

impl ConnectorKind {
    /// Returns a short, telemetry-safe kind tag for this variant.
    ///
    /// Safe to log, include in error messages, and use on the wire —
    /// never contains connection details.
    pub fn tag(&self) -> &'static str {
        #[allow(unreachable_patterns)]
        match self {
            ConnectorKind::Clickhouse { .. } => "clickhouse",
            ConnectorKind::Postgres { .. } => "postgres",
            ConnectorKind::Mysql { .. } => "mysql",
            ConnectorKind::Sqlite { .. } => "sqlite",
            ConnectorKind::Elasticsearch { .. } => "elasticsearch",
            ConnectorKind::Snowflake { .. } => "snowflake",
            ConnectorKind::Bigquery { .. } => "bigquery",
            ConnectorKind::Oracle { .. } => "oracle",
            ConnectorKind::Sqlserver { .. } => "sqlserver",
            _ => "unknown",
        }
    }
}

/// Configuration describing how to reach one data source instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    /// Unique connector identifier.
    pub id: ConnectorId,
    /// Display name. Not used by the engine.
    pub name: String,
    /// The database kind plus kind-specific settings.
    #[serde(flatten)]
    pub kind: ConnectorKind,
    /// Host name or address (empty for file-backed kinds).
    pub address: String,
    /// Login user.
    pub username: String,
    /// Login password, encrypted at rest.
    pub password: EncryptedSecret,
    /// Database/schema name, where the kind has one.
    pub database: Option<String>,
}
