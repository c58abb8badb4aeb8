use crate::chunking::{split_documents, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::models::{Document, NodeWithScore, TextNode};
use crate::query::RetrieverQueryEngine;
use crate::retriever::{VectorIndexRetriever, DEFAULT_SIMILARITY_TOP_K};
use crate::traits::LanguageModel;
use crate::{RagError, StorageError};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const EMBED_PROGRESS_BATCH: usize = 10;

/// In-memory vector index: nodes and their embeddings, in insertion order.
#[derive(Debug, Clone)]
pub struct VectorStoreIndex {
    index_id: String,
    nodes: Vec<TextNode>,
    embeddings: Vec<Vec<f32>>,
    dimensions: usize,
}

impl VectorStoreIndex {
    pub async fn from_documents<E>(
        documents: &[Document],
        embedder: &E,
        chunking: &ChunkingConfig,
        show_progress: bool,
    ) -> Result<Self, RagError>
    where
        E: Embedder + ?Sized,
    {
        let nodes = split_documents(documents, chunking)?;
        let embeddings = embed_nodes(&nodes, embedder, show_progress).await?;

        let dimensions = match embeddings.first() {
            Some(first) => first.len(),
            None => embedder.dimensions().unwrap_or(0),
        };
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        debug!(nodes = nodes.len(), dimensions, "built vector index");
        Ok(Self {
            index_id: Uuid::new_v4().to_string(),
            nodes,
            embeddings,
            dimensions,
        })
    }

    /// Rebuilds an index from persisted parts, checking they line up.
    pub fn from_parts(
        index_id: String,
        nodes: Vec<TextNode>,
        embeddings: Vec<Vec<f32>>,
        dimensions: usize,
    ) -> Result<Self, StorageError> {
        if nodes.len() != embeddings.len() {
            return Err(StorageError::Corrupt(format!(
                "{} nodes but {} embeddings",
                nodes.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimensions) {
            return Err(StorageError::Corrupt(format!(
                "embedding dimension {} != {}",
                bad.len(),
                dimensions
            )));
        }

        Ok(Self {
            index_id,
            nodes,
            embeddings,
            dimensions,
        })
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn nodes(&self) -> &[TextNode] {
        &self.nodes
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Exact cosine scan; equal scores keep insertion order.
    pub fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<NodeWithScore>, RagError> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_embedding.len(),
            });
        }

        let mut scored = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(position, embedding)| (position, cosine_similarity(query_embedding, embedding)))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(position, score)| NodeWithScore {
                node: self.nodes[position].clone(),
                score,
            })
            .collect())
    }

    /// Default query engine: top-2 retrieval, no postprocessing.
    pub fn as_query_engine<E, L>(
        self: Arc<Self>,
        embedder: Arc<E>,
        llm: Arc<L>,
    ) -> RetrieverQueryEngine<E, L>
    where
        E: Embedder + ?Sized,
        L: LanguageModel + ?Sized,
    {
        let retriever = VectorIndexRetriever::new(self, embedder, DEFAULT_SIMILARITY_TOP_K);
        RetrieverQueryEngine::new(retriever, llm)
    }
}

async fn embed_nodes<E>(
    nodes: &[TextNode],
    embedder: &E,
    show_progress: bool,
) -> Result<Vec<Vec<f32>>, RagError>
where
    E: Embedder + ?Sized,
{
    let progress = if show_progress {
        let bar = ProgressBar::new(nodes.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Generating embeddings");
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut embeddings = Vec::with_capacity(nodes.len());
    for batch in nodes.chunks(EMBED_PROGRESS_BATCH) {
        let texts = batch
            .iter()
            .map(|node| node.content_with_metadata())
            .collect::<Vec<_>>();

        let vectors = match embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(error) => {
                progress.abandon();
                return Err(error.into());
            }
        };
        if vectors.len() != texts.len() {
            progress.abandon();
            return Err(RagError::Service(crate::ServiceError::Malformed {
                backend: "embedder".to_string(),
                details: format!("{} vectors for {} texts", vectors.len(), texts.len()),
            }));
        }

        embeddings.extend(vectors);
        progress.inc(batch.len() as u64);
    }

    progress.finish_and_clear();
    Ok(embeddings)
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;

    for (a, b) in left.iter().zip(right.iter()) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    dot / (left_norm.sqrt() * right_norm.sqrt())
}
