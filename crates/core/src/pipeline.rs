use crate::chunking::ChunkingConfig;
use crate::embeddings::Embedder;
use crate::index::VectorStoreIndex;
use crate::models::Document;
use crate::query::{Response, RetrieverQueryEngine};
use crate::reader::DirectoryReader;
use crate::retriever::{SimilarityPostprocessor, VectorIndexRetriever};
use crate::traits::{IndexStorage, LanguageModel};
use crate::RagError;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const DEFAULT_QUERY_TOP_K: usize = 4;
pub const DEFAULT_SIMILARITY_CUTOFF: f64 = 0.80;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    pub recursive: bool,
    pub required_exts: Vec<String>,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            recursive: false,
            required_exts: Vec::new(),
            show_progress: true,
        }
    }
}

/// Wires document loading, index building, persistence and querying.
pub struct Orchestrator<E: ?Sized, L: ?Sized> {
    embedder: Arc<E>,
    llm: Arc<L>,
    options: PipelineOptions,
}

impl<E, L> Orchestrator<E, L>
where
    E: Embedder + ?Sized,
    L: LanguageModel + ?Sized,
{
    pub fn new(embedder: Arc<E>, llm: Arc<L>) -> Self {
        Self {
            embedder,
            llm,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn load_documents(&self, directory: &Path) -> Result<Vec<Document>, RagError> {
        let report = DirectoryReader::new(directory)
            .recursive(self.options.recursive)
            .required_exts(&self.options.required_exts)
            .load_data()?;

        if !report.skipped_files.is_empty() {
            warn!(
                "skipped_files={} for folder={}",
                report.skipped_files.len(),
                directory.display()
            );
        }

        Ok(report.documents)
    }

    async fn build_index(
        &self,
        directory: &Path,
        show_progress: bool,
    ) -> Result<VectorStoreIndex, RagError> {
        let documents = self.load_documents(directory)?;
        info!(documents = documents.len(), "Documents loaded successfully.");

        let index = VectorStoreIndex::from_documents(
            &documents,
            self.embedder.as_ref(),
            &self.options.chunking,
            show_progress,
        )
        .await?;
        info!(nodes = index.len(), "VectorStoreIndex created successfully.");
        Ok(index)
    }

    /// Builds an in-memory index over `directory` and its default query engine.
    pub async fn create_index_and_query_engine(
        &self,
        directory: &Path,
    ) -> Result<(Arc<VectorStoreIndex>, RetrieverQueryEngine<E, L>), RagError> {
        let result = async {
            let index = Arc::new(self.build_index(directory, self.options.show_progress).await?);
            let engine = Arc::clone(&index)
                .as_query_engine(Arc::clone(&self.embedder), Arc::clone(&self.llm));
            info!("QueryEngine created successfully.");
            Ok::<_, RagError>((index, engine))
        }
        .await;

        result.inspect_err(|error| error!("Error creating index and query engine: {error}"))
    }

    /// Queries `index` with a top-k retriever and a similarity cutoff, then
    /// prints the answer with its sources.
    pub async fn create_query_engine_and_query(
        &self,
        query_text: &str,
        index: &Arc<VectorStoreIndex>,
        similarity_top_k: usize,
        similarity_cutoff: f64,
    ) -> Result<Response, RagError> {
        let retriever = VectorIndexRetriever::new(
            Arc::clone(index),
            Arc::clone(&self.embedder),
            similarity_top_k,
        );
        let engine = RetrieverQueryEngine::new(retriever, Arc::clone(&self.llm))
            .with_postprocessor(SimilarityPostprocessor::new(similarity_cutoff));

        let response = engine
            .query(query_text)
            .await
            .inspect_err(|error| error!("Error creating query engine or querying: {error}"))?;

        response.pretty_print(true);
        Ok(response)
    }

    /// Loads the persisted index when `storage` has one, otherwise builds and
    /// persists it; then answers one query with the default engine.
    pub async fn create_or_load_index_and_query<S>(
        &self,
        query_text: &str,
        directory: &Path,
        storage: &S,
    ) -> Result<Response, RagError>
    where
        S: IndexStorage + ?Sized,
    {
        let result: Result<Response, RagError> = async {
            let index = if !storage.exists() {
                let index = self.build_index(directory, false).await?;
                storage.persist(&index)?;
                info!("Index created and stored successfully.");
                index
            } else {
                let index = storage.load()?;
                info!(nodes = index.len(), "Index loaded from storage.");
                index
            };

            let engine = Arc::new(index)
                .as_query_engine(Arc::clone(&self.embedder), Arc::clone(&self.llm));
            engine.query(query_text).await
        }
        .await;

        let response = result
            .inspect_err(|error| error!("Error creating or loading index and querying: {error}"))?;
        println!("{response}");
        Ok(response)
    }
}
