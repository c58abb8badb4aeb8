use crate::embeddings::Embedder;
use crate::models::{ChatMessage, NodeWithScore};
use crate::retriever::{SimilarityPostprocessor, VectorIndexRetriever};
use crate::traits::LanguageModel;
use crate::RagError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const EMPTY_RESPONSE: &str = "Empty Response";
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 12_000;

const PRINT_WIDTH: usize = 70;
const SOURCE_TEXT_CHARS: usize = 350;

const SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world.\n\
Always answer the query using the provided context information, and not prior knowledge.\n\
Some rules to follow:\n\
1. Never directly reference the given context in your answer.\n\
2. Avoid statements like 'Based on the context, ...' or \
'The context information ...' or anything along those lines.";

/// Answer produced by a query engine with the nodes it was grounded on.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub response: String,
    pub source_nodes: Vec<NodeWithScore>,
}

impl Response {
    pub fn empty() -> Self {
        Self {
            response: EMPTY_RESPONSE.to_string(),
            source_nodes: Vec::new(),
        }
    }

    pub fn pretty(&self, show_source: bool) -> String {
        let mut out = wrap_text(&format!("Final Response: {}", self.response), PRINT_WIDTH);

        if show_source {
            let separator = "_".repeat(PRINT_WIDTH);
            let total = self.source_nodes.len();
            for (position, source) in self.source_nodes.iter().enumerate() {
                out.push('\n');
                out.push_str(&separator);
                out.push_str(&format!("\nSource Node {}/{}\n", position + 1, total));
                out.push_str(&format!("Node ID: {}\n", source.node.node_id));
                out.push_str(&format!("Similarity: {}\n", source.score));
                let text = truncate_text(source.node.text.trim(), SOURCE_TEXT_CHARS);
                out.push_str(&wrap_text(&format!("Text: {text}"), PRINT_WIDTH));
            }
        }

        out
    }

    pub fn pretty_print(&self, show_source: bool) {
        println!("{}", self.pretty(show_source));
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.response)
    }
}

/// Retrieves, filters, then synthesizes an answer with compact-and-refine.
pub struct RetrieverQueryEngine<E: ?Sized, L: ?Sized> {
    retriever: VectorIndexRetriever<E>,
    llm: Arc<L>,
    postprocessors: Vec<SimilarityPostprocessor>,
    max_prompt_chars: usize,
}

impl<E, L> RetrieverQueryEngine<E, L>
where
    E: Embedder + ?Sized,
    L: LanguageModel + ?Sized,
{
    pub fn new(retriever: VectorIndexRetriever<E>, llm: Arc<L>) -> Self {
        Self {
            retriever,
            llm,
            postprocessors: Vec::new(),
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: SimilarityPostprocessor) -> Self {
        self.postprocessors.push(postprocessor);
        self
    }

    pub fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars.max(1);
        self
    }

    pub fn similarity_top_k(&self) -> usize {
        self.retriever.similarity_top_k()
    }

    pub async fn query(&self, query: &str) -> Result<Response, RagError> {
        let mut nodes = self.retriever.retrieve(query).await?;
        for postprocessor in &self.postprocessors {
            nodes = postprocessor.postprocess(nodes);
        }

        if nodes.is_empty() {
            debug!("no source nodes left after postprocessing");
            return Ok(Response::empty());
        }

        let contexts = nodes
            .iter()
            .map(|hit| hit.node.content_with_metadata())
            .collect::<Vec<_>>();
        let blocks = pack_contexts(&contexts, self.max_prompt_chars);

        let mut answer: Option<String> = None;
        for block in &blocks {
            let prompt = match &answer {
                None => text_qa_prompt(block, query),
                Some(existing) => refine_prompt(query, existing, block),
            };
            let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
            answer = Some(self.llm.complete(&messages).await?);
        }
        debug!(blocks = blocks.len(), sources = nodes.len(), "synthesized answer");

        Ok(Response {
            response: answer.unwrap_or_else(|| EMPTY_RESPONSE.to_string()),
            source_nodes: nodes,
        })
    }
}

pub fn text_qa_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: "
    )
}

pub fn refine_prompt(query: &str, existing_answer: &str, context: &str) -> String {
    format!(
        "The original query is as follows: {query}\n\
We have provided an existing answer: {existing_answer}\n\
We have the opportunity to refine the existing answer \
(only if needed) with some more context below.\n\
------------\n\
{context}\n\
------------\n\
Given the new context, refine the original answer to better answer the query. \
If the context isn't useful, return the original answer.\n\
Refined Answer: "
    )
}

/// Greedily joins contexts into blocks of at most `max_chars`; a single
/// oversize context still gets its own block.
fn pack_contexts(contexts: &[String], max_chars: usize) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for context in contexts {
        let packed_len = current.chars().count() + context.chars().count() + 2;
        if !current.is_empty() && packed_len > max_chars {
            blocks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(context);
    }

    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept = text.chars().take(max_chars.saturating_sub(3)).collect::<String>();
    format!("{kept}...")
}

fn wrap_text(text: &str, width: usize) -> String {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::tests::{sample_index, KeywordEmbedder};
    use crate::ServiceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every prompt and answers with a numbered reply.
    #[derive(Default)]
    pub(crate) struct RecordingModel {
        pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl RecordingModel {
        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
            let mut prompts = self.prompts.lock().expect("prompt log poisoned");
            prompts.push(messages.to_vec());
            Ok(format!("answer {}", prompts.len()))
        }
    }

    pub(crate) struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ServiceError> {
            Err(ServiceError::BackendResponse {
                backend: "openai".to_string(),
                details: "401 Unauthorized".to_string(),
            })
        }
    }

    async fn engine(
        top_k: usize,
        cutoff: Option<f64>,
        llm: Arc<RecordingModel>,
    ) -> RetrieverQueryEngine<KeywordEmbedder, RecordingModel> {
        let index = Arc::new(sample_index().await);
        let retriever = VectorIndexRetriever::new(index, Arc::new(KeywordEmbedder), top_k);
        let engine = RetrieverQueryEngine::new(retriever, llm);
        match cutoff {
            Some(cutoff) => engine.with_postprocessor(SimilarityPostprocessor::new(cutoff)),
            None => engine,
        }
    }

    #[tokio::test]
    async fn query_sends_filtered_context_to_model() {
        let llm = Arc::new(RecordingModel::default());
        let engine = engine(4, Some(0.8), Arc::clone(&llm)).await;

        let response = engine.query("What is Training Data ?").await.unwrap();
        assert_eq!(response.response, "answer 1");
        assert_eq!(response.source_nodes.len(), 1);
        assert_eq!(response.source_nodes[0].node.ref_doc_id, "training");

        let prompts = llm.prompts.lock().unwrap();
        let user = &prompts[0][1].content;
        assert!(user.contains("Training data is the labelled set"));
        assert!(user.contains("Query: What is Training Data ?"));
        assert!(!user.contains("page layout"));
    }

    #[tokio::test]
    async fn cutoff_above_one_gives_empty_response_without_model_call() {
        let llm = Arc::new(RecordingModel::default());
        let engine = engine(4, Some(1.01), Arc::clone(&llm)).await;

        let response = engine.query("What is Training Data ?").await.unwrap();
        assert_eq!(response.response, EMPTY_RESPONSE);
        assert!(response.source_nodes.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn small_prompt_budget_triggers_refine_calls() {
        let llm = Arc::new(RecordingModel::default());
        let engine = engine(3, None, Arc::clone(&llm))
            .await
            .with_max_prompt_chars(10);

        let response = engine.query("What is Training Data ?").await.unwrap();
        assert_eq!(llm.calls(), 3);
        assert_eq!(response.response, "answer 3");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[1][1]
            .content
            .contains("We have provided an existing answer: answer 1"));
    }

    #[tokio::test]
    async fn model_failure_is_returned_as_service_error() {
        let index = Arc::new(sample_index().await);
        let retriever = VectorIndexRetriever::new(index, Arc::new(KeywordEmbedder), 2);
        let engine = RetrieverQueryEngine::new(retriever, Arc::new(FailingModel));

        let result = engine.query("What is Training Data ?").await;
        assert!(matches!(result, Err(RagError::Service(_))));
    }

    #[test]
    fn pretty_output_lists_sources() {
        let response = Response {
            response: "Training data is what a model learns from.".to_string(),
            source_nodes: vec![NodeWithScore {
                node: crate::models::TextNode {
                    node_id: "node-1".to_string(),
                    ref_doc_id: "doc".to_string(),
                    chunk_index: 0,
                    text: "x".repeat(400),
                    metadata: Default::default(),
                },
                score: 0.9,
            }],
        };

        let pretty = response.pretty(true);
        assert!(pretty.starts_with("Final Response: Training data"));
        assert!(pretty.contains("Source Node 1/1"));
        assert!(pretty.contains("Node ID: node-1"));
        assert!(pretty.contains("Similarity: 0.9"));
        assert!(pretty.contains("..."));
        assert!(!response.pretty(false).contains("Source Node"));
    }

    #[test]
    fn wrap_text_respects_width() {
        let wrapped = wrap_text("one two three four", 9);
        assert_eq!(wrapped, "one two\nthree\nfour");
    }

    #[test]
    fn oversize_context_gets_its_own_block() {
        let blocks = pack_contexts(&["a".repeat(20), "b".to_string(), "c".to_string()], 10);
        assert_eq!(blocks, vec!["a".repeat(20), "b\n\nc".to_string()]);
    }
}
