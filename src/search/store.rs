//! Persisted embeddings index
//!
//! A single JSON file holding the model id, creation time, item count and
//! the ordered vector records. Writes go to a sibling temporary file that
//! is renamed over the target, so readers never see a partial index.
//!
//! The file is a single-writer resource. Concurrent rebuilds from separate
//! processes are not coordinated; the last rename wins.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::IndexError;

/// One product's feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
}

/// A complete embeddings index for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    #[serde(rename = "model")]
    pub model_id: String,
    /// Epoch seconds; indexes written before this field existed load as 0
    #[serde(default)]
    pub created_at: i64,
    pub count: usize,
    pub items: Vec<VectorRecord>,
}

impl Index {
    pub fn new(model_id: impl Into<String>, items: Vec<VectorRecord>) -> Self {
        Self {
            model_id: model_id.into(),
            created_at: chrono::Utc::now().timestamp(),
            count: items.len(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dimension of the stored vectors, if any
    pub fn dimension(&self) -> Option<usize> {
        self.items.first().map(|r| r.embedding.len())
    }

    /// Check `count == items.len()` and a single shared dimension
    fn check_shape(&self) -> Result<(), String> {
        if self.count != self.items.len() {
            return Err(format!(
                "count {} does not match {} items",
                self.count,
                self.items.len()
            ));
        }
        if let Some(dim) = self.dimension() {
            if let Some(bad) = self.items.iter().find(|r| r.embedding.len() != dim) {
                return Err(format!(
                    "item {} has dimension {}, expected {}",
                    bad.id,
                    bad.embedding.len(),
                    dim
                ));
            }
        }
        Ok(())
    }
}

/// Reads and writes the persisted index file
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the persisted index.
    ///
    /// Returns `Ok(None)` when no index has been written yet.
    pub fn load(&self) -> Result<Option<Index>, IndexError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted index");
                return Ok(None);
            }
            Err(e) => return Err(IndexError::Io(e)),
        };

        let index: Index = serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;
        index.check_shape().map_err(|reason| self.corrupt(reason))?;

        debug!(
            path = %self.path.display(),
            model = %index.model_id,
            count = index.count,
            "Loaded persisted index"
        );
        Ok(Some(index))
    }

    /// Persist the index, stamping the current time and item count.
    pub fn save(&self, index: &mut Index) -> Result<(), IndexError> {
        index.created_at = chrono::Utc::now().timestamp();
        index.count = index.items.len();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.temporary_path();
        if let Err(e) = write_json(&tmp_path, index) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(IndexError::Io(e));
        }

        info!(
            path = %self.path.display(),
            model = %index.model_id,
            count = index.count,
            "Saved embeddings index"
        );
        Ok(())
    }

    fn temporary_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_os_string();
        os.push(format!(".tmp.{}", std::process::id()));
        PathBuf::from(os)
    }

    fn corrupt(&self, reason: String) -> IndexError {
        IndexError::CorruptIndex {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

fn write_json(path: &Path, index: &Index) -> Result<(), IndexError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(&file);
    serde_json::to_writer(&mut writer, index)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: &[f32]) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding: embedding.to_vec(),
        }
    }

    #[test]
    fn test_load_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() -> Result<(), IndexError> {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("nested/embeddings.json"));

        let mut index = Index {
            model_id: "htp-v1".to_string(),
            created_at: 0,
            count: 99,
            items: vec![record("p1", &[1.0, 0.0]), record("p2", &[0.0, 1.0])],
        };
        store.save(&mut index)?;

        assert_eq!(index.count, 2);
        assert!(index.created_at > 0);

        let loaded = store.load()?.expect("index should exist");
        assert_eq!(loaded, index);
        Ok(())
    }

    #[test]
    fn test_save_leaves_no_temp_file() -> Result<(), IndexError> {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::new(dir.path().join("embeddings.json"));
        store.save(&mut Index::new("m", vec![record("p1", &[1.0])]))?;
        store.save(&mut Index::new("m", vec![]))?;

        let names: Vec<String> = fs::read_dir(dir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["embeddings.json".to_string()]);
        assert!(store.load()?.unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        // A non-empty directory in the way makes the rename fail
        fs::create_dir_all(path.join("occupied")).unwrap();

        let store = EmbeddingStore::new(&path);
        let result = store.save(&mut Index::new("m", vec![record("p1", &[1.0])]));

        assert!(matches!(result, Err(IndexError::Io(_))));
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_wire_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        let store = EmbeddingStore::new(&path);
        store
            .save(&mut Index::new("ViT-B/32", vec![record("p1", &[0.6, 0.8])]))
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["model"], "ViT-B/32");
        assert_eq!(value["count"], 1);
        assert!(value["created_at"].is_i64());
        assert_eq!(value["items"][0]["id"], "p1");
        assert_eq!(value["items"][0]["embedding"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_loads_legacy_index_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        fs::write(
            &path,
            r#"{"model": "ViT-B/32", "count": 1, "items": [{"id": "p1", "embedding": [1.0, 0.0]}]}"#,
        )
        .unwrap();

        let index = EmbeddingStore::new(&path).load().unwrap().unwrap();
        assert_eq!(index.model_id, "ViT-B/32");
        assert_eq!(index.created_at, 0);
        assert_eq!(index.items[0].id, "p1");
    }

    #[test]
    fn test_corrupt_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            EmbeddingStore::new(&path).load(),
            Err(IndexError::CorruptIndex { .. })
        ));

        fs::write(&path, r#"{"model": "m", "count": 3, "items": []}"#).unwrap();
        assert!(matches!(
            EmbeddingStore::new(&path).load(),
            Err(IndexError::CorruptIndex { .. })
        ));

        fs::write(
            &path,
            r#"{"model": "m", "count": 2, "items": [
                {"id": "a", "embedding": [1.0, 0.0]},
                {"id": "b", "embedding": [1.0]}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(
            EmbeddingStore::new(&path).load(),
            Err(IndexError::CorruptIndex { .. })
        ));
    }
}
