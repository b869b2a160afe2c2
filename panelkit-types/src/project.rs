//! The in-memory project and panel model the engine consumes.
//!
//! Projects are created and persisted by the storage layer outside this
//! workspace; the engine only reads panels and writes back their status
//! and result metadata during evaluation.

use serde::{Deserialize, Serialize};

use crate::id::{ConnectorId, PanelId, ProjectId};

/// A unit of project logic producing one cached result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    /// Stable identifier, unique within the project.
    pub id: PanelId,
    /// Display name. Not used by the engine.
    pub name: String,
    /// What kind of work this panel does.
    pub kind: PanelKind,
    /// The panel's content (query text, program source, URL, ...).
    /// May reference other panels' results via `{{panel:ID}}`.
    pub content: String,
    /// The connector this panel runs against, if any.
    pub connector_id: Option<ConnectorId>,
    /// Current evaluation status. Mutated only by the orchestrator.
    pub status: PanelStatus,
    /// Metadata from the most recent completed evaluation.
    pub last_result: Option<ResultMeta>,
}

impl Panel {
    /// Create a new unevaluated panel.
    pub fn new(id: impl Into<PanelId>, kind: PanelKind, content: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            kind,
            content: content.into(),
            connector_id: None,
            status: PanelStatus::Unevaluated,
            last_result: None,
        }
    }

    /// Builder-style connector assignment.
    pub fn with_connector(mut self, connector: impl Into<ConnectorId>) -> Self {
        self.connector_id = Some(connector.into());
        self
    }
}

/// The kind of work a panel performs.
///
/// Non-database kinds share the dispatch contract (same runner seam, same
/// result shape) but carry no engine-specific behavior here.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelKind {
    /// Runs a query against a database connector.
    Database,
    /// Reads a static file.
    File,
    /// Fetches an HTTP resource.
    Http,
    /// Runs transformation code.
    Program,
}

impl PanelKind {
    /// Short tag for logs and for the synthetic execution target of
    /// connectorless panels.
    pub fn tag(&self) -> &'static str {
        #[allow(unreachable_patterns)]
        match self {
            PanelKind::Database => "database",
            PanelKind::File => "file",
            PanelKind::Http => "http",
            PanelKind::Program => "program",
            _ => "unknown",
        }
    }
}

/// Per-panel evaluation state machine:
/// `unevaluated -> running -> {done | error | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelStatus {
    /// Never evaluated (or reset).
    Unevaluated,
    /// Dispatch is in flight.
    Running,
    /// Last evaluation produced rows.
    Done,
    /// Last evaluation failed; the error is persisted in the result store.
    Error,
    /// The caller cancelled the evaluation before it completed.
    Cancelled,
}

/// Metadata about a panel's most recent completed evaluation.
///
/// `evaluated_at_ms` makes staleness observable: a dependent panel that
/// consumed a persisted result can compare timestamps instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    /// When the evaluation finished (Unix timestamp milliseconds).
    pub evaluated_at_ms: u64,
    /// How long dispatch plus the store write took.
    pub elapsed_ms: u64,
    /// Number of rows produced (0 on error).
    pub row_count: usize,
}

/// An ordered collection of panels evaluated together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Panels in user-defined order. Ids are unique.
    pub panels: Vec<Panel>,
}

impl Project {
    /// Create a new project.
    pub fn new(id: impl Into<ProjectId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            panels: vec![],
        }
    }

    /// Look up a panel by id.
    pub fn panel(&self, id: &PanelId) -> Option<&Panel> {
        self.panels.iter().find(|p| &p.id == id)
    }

    /// Look up a panel mutably by id.
    pub fn panel_mut(&mut self, id: &PanelId) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|p| &p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_starts_unevaluated() {
        let panel = Panel::new("p1", PanelKind::Database, "SELECT 1");
        assert_eq!(panel.status, PanelStatus::Unevaluated);
        assert!(panel.last_result.is_none());
        assert!(panel.connector_id.is_none());
    }

    #[test]
    fn with_connector_sets_reference() {
        let panel = Panel::new("p1", PanelKind::Database, "SELECT 1").with_connector("c1");
        assert_eq!(panel.connector_id, Some(ConnectorId::new("c1")));
    }

    #[test]
    fn project_panel_lookup() {
        let mut project = Project::new("prj", "demo");
        project
            .panels
            .push(Panel::new("a", PanelKind::Database, "SELECT 1"));
        assert!(project.panel(&PanelId::new("a")).is_some());
        assert!(project.panel(&PanelId::new("b")).is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(PanelStatus::Unevaluated).unwrap();
        assert_eq!(json, "unevaluated");
        let json = serde_json::to_value(PanelStatus::Cancelled).unwrap();
        assert_eq!(json, "cancelled");
    }
}
