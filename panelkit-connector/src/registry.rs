//! Lookup of connectors by id.

use panelkit_types::{ConnectorId, ConnectorInfo, EvalError};
use std::collections::HashMap;

use crate::capability::ConnectorCapabilities;

/// Holds every connector a project can reference, keyed by id.
///
/// Connectors are normalized (default ports filled in) on registration,
/// so everything downstream sees concrete connection parameters.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, ConnectorInfo>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Register a connector, replacing any previous one with the same id.
    pub fn register(&mut self, info: ConnectorInfo) {
        let info = info.normalized();
        self.connectors.insert(info.id.to_string(), info);
    }

    /// Resolve a connector id. Fails with [`EvalError::NotFound`] if no
    /// connector with that id was registered.
    pub fn resolve(&self, id: &ConnectorId) -> Result<&ConnectorInfo, EvalError> {
        self.connectors
            .get(id.as_str())
            .ok_or_else(|| EvalError::NotFound(id.clone()))
    }

    /// Number of registered connectors.
    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}
