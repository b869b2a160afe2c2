//! The uniform result shape every runner returns.

use serde_json::Value;

use crate::error::PanelError;

/// One result row: column name to scalar value, insertion-ordered as the
/// data source produced it.
pub type Row = serde_json::Map<String, Value>;

/// A panel's evaluation output: either an ordered row sequence or a
/// captured error. Owned by the result store until the next evaluation
/// of the same panel overwrites it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    /// The rows, in source order. Empty on failure.
    pub rows: Vec<Row>,
    /// The captured failure, if the evaluation did not succeed.
    pub error: Option<PanelError>,
}

impl ResultRecord {
    /// A successful result.
    pub fn success(rows: Vec<Row>) -> Self {
        Self { rows, error: None }
    }

    /// A failed result.
    pub fn failure(error: PanelError) -> Self {
        Self {
            rows: vec![],
            error: Some(error),
        }
    }

    /// Whether this record represents a successful evaluation.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn success_has_no_error() {
        let mut row = Row::new();
        row.insert("number".into(), json!(42));
        let record = ResultRecord::success(vec![row]);
        assert!(record.is_success());
        assert_eq!(record.rows.len(), 1);
    }

    #[test]
    fn failure_has_no_rows() {
        let record = ResultRecord::failure(PanelError::new(ErrorKind::Query, "bad sql"));
        assert!(!record.is_success());
        assert!(record.rows.is_empty());
    }
}
