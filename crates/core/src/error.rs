use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{var} environment variable is not set")]
    Missing { var: String },

    #[error("env file error: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("directory {0} does not exist")]
    MissingDirectory(String),

    #[error("no documents found in {0}")]
    NoDocuments(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} is not set")]
    MissingCredential(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed response from {backend}: {details}")]
    Malformed { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("persisted file is missing: {0}")]
    MissingFile(PathBuf),

    #[error("serialize error in {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("persisted index is inconsistent: {0}")]
    Corrupt(String),
}

/// Error returned by every pipeline operation, one variant per failing stage.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("credential setup failed: {0}")]
    Credential(#[from] CredentialError),

    #[error("document loading failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("model service failed: {0}")]
    Service(#[from] ServiceError),

    #[error("index storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query is empty")]
    EmptyQuery,
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
