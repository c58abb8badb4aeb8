use crate::index::VectorStoreIndex;
use crate::models::ChatMessage;
use crate::{ServiceError, StorageError};
use async_trait::async_trait;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

/// Where a built index is persisted between runs.
pub trait IndexStorage {
    fn exists(&self) -> bool;

    fn persist(&self, index: &VectorStoreIndex) -> Result<(), StorageError>;

    fn load(&self) -> Result<VectorStoreIndex, StorageError>;
}
