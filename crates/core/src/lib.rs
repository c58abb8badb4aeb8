pub mod chunking;
pub mod credentials;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod query;
pub mod reader;
pub mod retriever;
pub mod storage;
pub mod traits;

pub use chunking::{chunk_by_paragraph, normalize_whitespace, split_documents, ChunkingConfig};
pub use credentials::{setup_openai_api_key, ApiKey, OPENAI_API_KEY_VAR};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CredentialError, IngestError, RagError, ServiceError, StorageError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{cosine_similarity, VectorStoreIndex};
pub use models::{ChatMessage, Document, Metadata, NodeWithScore, Role, TextNode};
pub use openai::{OpenAiChat, OpenAiClient, OpenAiConfig, OpenAiEmbedder};
pub use pipeline::{
    Orchestrator, PipelineOptions, DEFAULT_QUERY_TOP_K, DEFAULT_SIMILARITY_CUTOFF,
};
pub use query::{Response, RetrieverQueryEngine, EMPTY_RESPONSE};
pub use reader::{DirectoryReader, LoadReport, SkippedFile};
pub use retriever::{SimilarityPostprocessor, VectorIndexRetriever, DEFAULT_SIMILARITY_TOP_K};
pub use storage::{FsIndexStorage, DEFAULT_PERSIST_DIR};
pub use traits::{IndexStorage, LanguageModel};
