use crate::index::VectorStoreIndex;
use crate::models::TextNode;
use crate::traits::IndexStorage;
use crate::StorageError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_PERSIST_DIR: &str = "./storage";
pub const DOCSTORE_FILE: &str = "docstore.json";
pub const VECTOR_STORE_FILE: &str = "default__vector_store.json";
pub const INDEX_STORE_FILE: &str = "index_store.json";

#[derive(Debug, Serialize, Deserialize)]
struct DocStoreFile {
    nodes: BTreeMap<String, TextNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorStoreFile {
    embedding_dict: BTreeMap<String, Vec<f32>>,
    text_id_to_ref_doc_id: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexStoreFile {
    index_id: String,
    dimensions: usize,
    node_ids: Vec<String>,
}

/// Persists an index as three JSON files inside one directory.
#[derive(Debug, Clone)]
pub struct FsIndexStorage {
    persist_dir: PathBuf,
}

impl Default for FsIndexStorage {
    fn default() -> Self {
        Self::new(DEFAULT_PERSIST_DIR)
    }
}

impl FsIndexStorage {
    pub fn new(persist_dir: impl Into<PathBuf>) -> Self {
        Self {
            persist_dir: persist_dir.into(),
        }
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }
}

impl IndexStorage for FsIndexStorage {
    fn exists(&self) -> bool {
        self.persist_dir.is_dir()
    }

    fn persist(&self, index: &VectorStoreIndex) -> Result<(), StorageError> {
        fs::create_dir_all(&self.persist_dir).map_err(|source| StorageError::Io {
            path: self.persist_dir.clone(),
            source,
        })?;

        let nodes = index
            .nodes()
            .iter()
            .map(|node| (node.node_id.clone(), node.clone()))
            .collect();
        let embedding_dict = index
            .nodes()
            .iter()
            .zip(index.embeddings())
            .map(|(node, embedding)| (node.node_id.clone(), embedding.clone()))
            .collect();
        let text_id_to_ref_doc_id = index
            .nodes()
            .iter()
            .map(|node| (node.node_id.clone(), node.ref_doc_id.clone()))
            .collect();

        write_json(
            &self.persist_dir.join(DOCSTORE_FILE),
            &DocStoreFile { nodes },
        )?;
        write_json(
            &self.persist_dir.join(VECTOR_STORE_FILE),
            &VectorStoreFile {
                embedding_dict,
                text_id_to_ref_doc_id,
            },
        )?;
        write_json(
            &self.persist_dir.join(INDEX_STORE_FILE),
            &IndexStoreFile {
                index_id: index.index_id().to_string(),
                dimensions: index.dimensions(),
                node_ids: index.nodes().iter().map(|node| node.node_id.clone()).collect(),
            },
        )?;

        debug!(dir = %self.persist_dir.display(), nodes = index.len(), "persisted index");
        Ok(())
    }

    fn load(&self) -> Result<VectorStoreIndex, StorageError> {
        let index_store: IndexStoreFile = read_json(&self.persist_dir.join(INDEX_STORE_FILE))?;
        let mut docstore: DocStoreFile = read_json(&self.persist_dir.join(DOCSTORE_FILE))?;
        let mut vector_store: VectorStoreFile =
            read_json(&self.persist_dir.join(VECTOR_STORE_FILE))?;

        let mut nodes = Vec::with_capacity(index_store.node_ids.len());
        let mut embeddings = Vec::with_capacity(index_store.node_ids.len());
        for node_id in &index_store.node_ids {
            let node = docstore.nodes.remove(node_id).ok_or_else(|| {
                StorageError::Corrupt(format!("node {node_id} missing from {DOCSTORE_FILE}"))
            })?;
            let embedding = vector_store.embedding_dict.remove(node_id).ok_or_else(|| {
                StorageError::Corrupt(format!("node {node_id} missing from {VECTOR_STORE_FILE}"))
            })?;
            nodes.push(node);
            embeddings.push(embedding);
        }

        debug!(dir = %self.persist_dir.display(), nodes = nodes.len(), "loaded index");
        VectorStoreIndex::from_parts(
            index_store.index_id,
            nodes,
            embeddings,
            index_store.dimensions,
        )
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| {
        StorageError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    })?;
    fs::write(path, body).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    if !path.is_file() {
        return Err(StorageError::MissingFile(path.to_path_buf()));
    }

    let body = fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| StorageError::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::sample_index;
    use tempfile::tempdir;

    #[tokio::test]
    async fn persisted_index_loads_back_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = FsIndexStorage::new(dir.path().join("storage"));
        assert!(!storage.exists());

        let index = sample_index().await;
        storage.persist(&index)?;
        assert!(storage.exists());
        for file in [DOCSTORE_FILE, VECTOR_STORE_FILE, INDEX_STORE_FILE] {
            assert!(storage.persist_dir().join(file).is_file());
        }

        let loaded = storage.load()?;
        assert_eq!(loaded.index_id(), index.index_id());
        assert_eq!(loaded.nodes(), index.nodes());
        assert_eq!(loaded.embeddings(), index.embeddings());
        assert_eq!(loaded.dimensions(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_store_file_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = FsIndexStorage::new(dir.path());
        storage.persist(&sample_index().await)?;
        fs::remove_file(dir.path().join(VECTOR_STORE_FILE))?;

        let result = storage.load();
        assert!(matches!(
            result,
            Err(StorageError::MissingFile(path)) if path.ends_with(VECTOR_STORE_FILE)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn dangling_node_id_is_corrupt() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = FsIndexStorage::new(dir.path());
        storage.persist(&sample_index().await)?;
        fs::write(
            dir.path().join(DOCSTORE_FILE),
            serde_json::to_string(&DocStoreFile {
                nodes: BTreeMap::new(),
            })?,
        )?;

        assert!(matches!(storage.load(), Err(StorageError::Corrupt(_))));
        Ok(())
    }

    #[test]
    fn empty_directory_exists_but_does_not_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = FsIndexStorage::new(dir.path());
        assert!(storage.exists());
        assert!(matches!(storage.load(), Err(StorageError::MissingFile(_))));
        Ok(())
    }

    #[tokio::test]
    async fn file_at_persist_path_is_not_an_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("storage");
        fs::write(&path, "not a directory")?;

        let storage = FsIndexStorage::new(&path);
        assert!(!storage.exists());
        assert!(matches!(
            storage.persist(&sample_index().await),
            Err(StorageError::Io { .. })
        ));
        Ok(())
    }
}
