#![deny(missing_docs)]
//! File-backed result cache with atomic overwrites.
//!
//! One file per `(project, panel)` pair at
//! `<root>/<project-id>/<panel-id>` (both components percent-encoded).
//! File content is the public contract external tools read directly:
//! a single JSON array of row objects on success, or
//! `{"error": {"kind": ..., "message": ...}}` on failure.
//!
//! Writes go to a temporary file in the same directory followed by an
//! atomic rename, so a concurrent reader sees either the previous
//! complete document or the new one, never a partial write. Overwriting
//! a panel's prior result is unconditional; there is no versioning.

use panelkit_types::{PanelError, PanelId, ProjectId, ResultRecord, Row, StoreError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter making temporary file names unique within the process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Encode a path component into a safe filename.
fn encode_component(raw: &str) -> String {
    let mut encoded = String::new();
    for ch in raw.chars() {
        match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => encoded.push(ch),
            _ => {
                for byte in ch.to_string().as_bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    encoded
}

/// Atomic, addressable persistence of each panel's output.
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    /// Create a store rooted at the given directory.
    ///
    /// Directories are created lazily on first write.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// The canonical path of a panel's result file. Public because the
    /// file layout is a stable contract for external readers.
    pub fn result_path(&self, project: &ProjectId, panel: &PanelId) -> PathBuf {
        self.root
            .join(encode_component(project.as_str()))
            .join(encode_component(panel.as_str()))
    }

    /// Persist a panel's result, replacing any previous one atomically.
    pub async fn write(
        &self,
        project: &ProjectId,
        panel: &PanelId,
        record: &ResultRecord,
    ) -> Result<(), StoreError> {
        let document = match &record.error {
            Some(error) => serde_json::json!({ "error": error }),
            None => Value::Array(record.rows.iter().cloned().map(Value::Object).collect()),
        };
        let contents = serde_json::to_vec(&document)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let path = self.result_path(project, panel);
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::WriteFailed("result path has no parent".into()))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        // Same-directory temporary so the rename cannot cross filesystems.
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(
            ".{}.tmp-{seq}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("result")
        ));
        tokio::fs::write(&tmp, &contents)
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            // Best effort: don't leave the temporary behind.
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::WriteFailed(e.to_string()));
        }
        Ok(())
    }

    /// Read a panel's last persisted result. `Ok(None)` when the panel
    /// has never been evaluated.
    pub async fn read(
        &self,
        project: &ProjectId,
        panel: &PanelId,
    ) -> Result<Option<ResultRecord>, StoreError> {
        let path = self.result_path(project, panel);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::ReadFailed(e.to_string())),
        };
        let document: Value = serde_json::from_slice(&contents)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(decode_document(document)?))
    }
}

/// Decode the public file format back into a [`ResultRecord`].
fn decode_document(document: Value) -> Result<ResultRecord, StoreError> {
    match document {
        Value::Array(values) => {
            let mut rows: Vec<Row> = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Object(row) => rows.push(row),
                    other => {
                        return Err(StoreError::Serialization(format!(
                            "expected row object, got {other}"
                        )));
                    }
                }
            }
            Ok(ResultRecord::success(rows))
        }
        Value::Object(mut obj) => {
            let error = obj.remove("error").ok_or_else(|| {
                StoreError::Serialization("result object missing error field".into())
            })?;
            let error: PanelError = serde_json::from_value(error)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(ResultRecord::failure(error))
        }
        other => Err(StoreError::Serialization(format!(
            "expected array or error object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelkit_types::ErrorKind;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert((*k).into(), v.clone());
        }
        row
    }

    #[test]
    fn encoding_is_filesystem_safe_and_deterministic() {
        assert_eq!(encode_component("simple-id_1.2"), "simple-id_1.2");
        assert_eq!(encode_component("a/b"), "a%2Fb");
        assert_eq!(encode_component("a b"), "a%20b");
        assert_eq!(encode_component("a/b"), encode_component("a/b"));
    }

    #[tokio::test]
    async fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let record = ResultRecord::success(vec![row(&[("number", json!(42))])]);

        store
            .write(&ProjectId::new("prj"), &PanelId::new("p1"), &record)
            .await
            .unwrap();
        let read = store
            .read(&ProjectId::new("prj"), &PanelId::new("p1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, record);
    }

    #[tokio::test]
    async fn success_file_is_a_bare_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let record = ResultRecord::success(vec![row(&[("number", json!(42))])]);
        store
            .write(&ProjectId::new("prj"), &PanelId::new("p1"), &record)
            .await
            .unwrap();

        // External readers parse the file directly; the layout is public.
        let path = store.result_path(&ProjectId::new("prj"), &PanelId::new("p1"));
        let raw = std::fs::read_to_string(path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!([{ "number": 42 }]));
    }

    #[tokio::test]
    async fn error_file_is_a_structured_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let record =
            ResultRecord::failure(PanelError::new(ErrorKind::Query, "unknown table widgets"));
        store
            .write(&ProjectId::new("prj"), &PanelId::new("p1"), &record)
            .await
            .unwrap();

        let path = store.result_path(&ProjectId::new("prj"), &PanelId::new("p1"));
        let raw = std::fs::read_to_string(path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["error"]["kind"], "query");
        assert_eq!(parsed["error"]["message"], "unknown table widgets");

        let read = store
            .read(&ProjectId::new("prj"), &PanelId::new("p1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!read.is_success());
        assert_eq!(read.error.unwrap().kind, ErrorKind::Query);
    }

    #[tokio::test]
    async fn read_nonexistent_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let read = store
            .read(&ProjectId::new("prj"), &PanelId::new("missing"))
            .await
            .unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn overwrite_is_unconditional() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let project = ProjectId::new("prj");
        let panel = PanelId::new("p1");

        let first = ResultRecord::success(vec![row(&[("v", json!(1))])]);
        let second = ResultRecord::success(vec![row(&[("v", json!(2))])]);
        store.write(&project, &panel, &first).await.unwrap();
        store.write(&project, &panel, &second).await.unwrap();

        let read = store.read(&project, &panel).await.unwrap().unwrap();
        assert_eq!(read, second);
    }

    #[tokio::test]
    async fn no_temporary_files_remain_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let record = ResultRecord::success(vec![]);
        store
            .write(&ProjectId::new("prj"), &PanelId::new("p1"), &record)
            .await
            .unwrap();

        let project_dir = dir.path().join("prj");
        let names: Vec<String> = std::fs::read_dir(&project_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_readers_never_see_partial_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(ResultStore::new(dir.path()));
        let project = ProjectId::new("prj");
        let panel = PanelId::new("p1");

        // Seed so the reader always finds a file.
        let wide_row = row(&[("payload", json!("x".repeat(64 * 1024)))]);
        store
            .write(&project, &panel, &ResultRecord::success(vec![wide_row.clone()]))
            .await
            .unwrap();

        let reader = {
            let store = std::sync::Arc::clone(&store);
            let (project, panel) = (project.clone(), panel.clone());
            tokio::spawn(async move {
                for _ in 0..200 {
                    let record = store.read(&project, &panel).await.unwrap().unwrap();
                    // Every observed document is complete: exactly one row.
                    assert_eq!(record.rows.len(), 1);
                }
            })
        };

        for _ in 0..200 {
            store
                .write(&project, &panel, &ResultRecord::success(vec![wide_row.clone()]))
                .await
                .unwrap();
        }
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn ids_with_separators_stay_inside_the_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let project = ProjectId::new("my project");
        let panel = PanelId::new("panel/one");

        store
            .write(&project, &panel, &ResultRecord::success(vec![]))
            .await
            .unwrap();
        let path = store.result_path(&project, &panel);
        assert!(path.starts_with(dir.path()));
        assert!(path.ends_with("my%20project/panel%2Fone"));
        assert!(store.read(&project, &panel).await.unwrap().is_some());
    }
}
