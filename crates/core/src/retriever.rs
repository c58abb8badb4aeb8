use crate::embeddings::Embedder;
use crate::index::VectorStoreIndex;
use crate::models::NodeWithScore;
use crate::RagError;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SIMILARITY_TOP_K: usize = 2;

pub struct VectorIndexRetriever<E: ?Sized> {
    index: Arc<VectorStoreIndex>,
    embedder: Arc<E>,
    similarity_top_k: usize,
}

impl<E> VectorIndexRetriever<E>
where
    E: Embedder + ?Sized,
{
    pub fn new(index: Arc<VectorStoreIndex>, embedder: Arc<E>, similarity_top_k: usize) -> Self {
        Self {
            index,
            embedder,
            similarity_top_k,
        }
    }

    pub fn similarity_top_k(&self) -> usize {
        self.similarity_top_k
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<NodeWithScore>, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let query_embedding = self.embedder.embed_query(query).await?;
        let hits = self
            .index
            .similarity_search(&query_embedding, self.similarity_top_k)?;
        debug!(top_k = self.similarity_top_k, hits = hits.len(), "retrieved nodes");
        Ok(hits)
    }
}

/// Drops retrieved nodes scoring below the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityPostprocessor {
    pub similarity_cutoff: f64,
}

impl SimilarityPostprocessor {
    pub fn new(similarity_cutoff: f64) -> Self {
        Self { similarity_cutoff }
    }

    pub fn postprocess(&self, nodes: Vec<NodeWithScore>) -> Vec<NodeWithScore> {
        nodes
            .into_iter()
            .filter(|node| node.score >= self.similarity_cutoff)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{sample_index, KeywordEmbedder};
    use crate::models::{Metadata, TextNode};

    fn scored(id: &str, score: f64) -> NodeWithScore {
        NodeWithScore {
            node: TextNode {
                node_id: id.to_string(),
                ref_doc_id: id.to_string(),
                chunk_index: 0,
                text: id.to_string(),
                metadata: Metadata::new(),
            },
            score,
        }
    }

    #[test]
    fn cutoff_keeps_scores_at_or_above_threshold() {
        let kept = SimilarityPostprocessor::new(0.8).postprocess(vec![
            scored("a", 0.95),
            scored("b", 0.8),
            scored("c", 0.79),
        ]);
        let ids = kept.iter().map(|hit| hit.node.node_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn cutoff_above_one_drops_everything() {
        let kept = SimilarityPostprocessor::new(1.01).postprocess(vec![scored("a", 1.0)]);
        assert!(kept.is_empty());
    }

    #[tokio::test]
    async fn retriever_limits_to_top_k() {
        let index = Arc::new(sample_index().await);
        let retriever = VectorIndexRetriever::new(index, Arc::new(KeywordEmbedder), 1);

        let hits = retriever.retrieve("what is sampling").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node.ref_doc_id, "sampling");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let index = Arc::new(sample_index().await);
        let retriever = VectorIndexRetriever::new(index, Arc::new(KeywordEmbedder), 4);
        assert!(matches!(retriever.retrieve("   ").await, Err(RagError::EmptyQuery)));
    }
}
