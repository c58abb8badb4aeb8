use crate::credentials::{ApiKey, OPENAI_API_KEY_VAR};
use crate::embeddings::Embedder;
use crate::models::ChatMessage;
use crate::traits::LanguageModel;
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const EMBED_BATCH_SIZE: usize = 10;

const BACKEND: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<ApiKey>,
    pub api_base: Url,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
}

impl OpenAiConfig {
    pub fn new(api_key: Option<ApiKey>) -> Result<Self, ServiceError> {
        Ok(Self {
            api_key,
            api_base: Url::parse(DEFAULT_API_BASE)?,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Reads `OPENAI_API_KEY` and the optional `OPENAI_API_BASE`. A missing
    /// key is only reported when a request is made.
    pub fn from_env() -> Result<Self, ServiceError> {
        let api_key = std::env::var(OPENAI_API_KEY_VAR)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(ApiKey::new);

        let config = Self::new(api_key)?;
        match std::env::var("OPENAI_API_BASE") {
            Ok(base) if !base.trim().is_empty() => config.with_api_base(base.trim()),
            _ => Ok(config),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Result<Self, ServiceError> {
        self.api_base = Url::parse(base)?;
        Ok(self)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base.as_str().trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ServiceError> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ServiceError::MissingCredential(OPENAI_API_KEY_VAR.to_string()))?;
        let url = self.config.endpoint(path);
        debug!(%url, "openai request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {}", body.trim()),
            });
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            batch_size: EMBED_BATCH_SIZE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client.config.embedding_model = model.into();
        self
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let input = texts
            .iter()
            .map(|text| text.replace('\n', " "))
            .collect::<Vec<_>>();
        let request = EmbeddingRequest {
            model: &self.client.config.embedding_model,
            input: &input,
        };

        let response: EmbeddingResponse =
            self.client.post("embeddings", &request).await?.json().await?;
        order_embeddings(response, texts.len())
    }
}

fn order_embeddings(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    if response.data.len() != expected {
        return Err(ServiceError::Malformed {
            backend: BACKEND.to_string(),
            details: format!(
                "embedding count {} doesn't match input count {}",
                response.data.len(),
                expected
            ),
        });
    }

    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> Option<usize> {
        None
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size.max(1)) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: OpenAiClient,
}

impl OpenAiChat {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client.config.chat_model = model.into();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let request = ChatRequest {
            model: &self.client.config.chat_model,
            messages,
            temperature: self.client.config.temperature,
        };

        let response: ChatResponse = self
            .client
            .post("chat/completions", &request)
            .await?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ServiceError::Malformed {
                backend: BACKEND.to_string(),
                details: "chat completion had no content".to_string(),
            })
    }
}
