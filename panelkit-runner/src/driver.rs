//! Leaf adapters for in-process connector I/O.
//!
//! The catalog of real database drivers lives outside this workspace;
//! each one plugs in behind [`ConnectorDriver`], the uniform contract
//! every in-process driver implements: take an execution target and
//! panel content, return rows. The [`DriverRegistry`] dispatches by connector
//! kind tag, the same composition pattern as the connector registry.

use async_trait::async_trait;
use panelkit_connector::ExecutionTarget;
use panelkit_types::{EvalError, Row};
use std::collections::HashMap;
use std::sync::Arc;

/// One in-process connector implementation.
///
/// Implementations open their own client session against the target,
/// issue the content verbatim, and collect rows. The target's password
/// is read through scoped exposure at the point of use and must not be
/// retained, logged, or echoed into errors.
#[async_trait]
pub trait ConnectorDriver: Send + Sync {
    /// The connector kind tag this driver serves (`"clickhouse"`, ...).
    fn kind(&self) -> &'static str;

    /// Execute the panel content against the target.
    async fn query(&self, target: &ExecutionTarget, content: &str) -> Result<Vec<Row>, EvalError>;
}

/// Dispatches in-process queries to the driver registered for a kind.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<&'static str, Arc<dyn ConnectorDriver>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Register a driver under its kind tag, replacing any previous one.
    pub fn register(&mut self, driver: Arc<dyn ConnectorDriver>) {
        self.drivers.insert(driver.kind(), driver);
    }

    /// Look up the driver for a kind tag.
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn ConnectorDriver>> {
        self.drivers.get(kind)
    }
}
