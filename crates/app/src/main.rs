use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_rag_core::openai::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use doc_rag_core::{
    setup_openai_api_key, CharacterNgramEmbedder, Embedder, FsIndexStorage, LanguageModel,
    OpenAiChat, OpenAiClient, OpenAiConfig, OpenAiEmbedder, Orchestrator, PipelineOptions,
    DEFAULT_PERSIST_DIR, DEFAULT_QUERY_TOP_K, DEFAULT_SIMILARITY_CUTOFF,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEMO_ADHOC_QUERY: &str = "What is Training Data ?";
const DEMO_PERSISTED_QUERY: &str = "What are Nonprobability Sampling?";

#[derive(Parser)]
#[command(name = "doc-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Folder that contains the documents to index
    #[arg(long, env = "DOC_RAG_DOCUMENTS", default_value = "./pdf", global = true)]
    documents: PathBuf,

    /// Directory used to persist the index between runs
    #[arg(long, env = "DOC_RAG_PERSIST_DIR", default_value = DEFAULT_PERSIST_DIR, global = true)]
    persist_dir: PathBuf,

    /// Env file holding OPENAI_API_KEY (defaults to .env lookup)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Descend into subdirectories of the document folder
    #[arg(long, default_value_t = false, global = true)]
    recursive: bool,

    /// Embed with the local trigram embedder instead of the hosted model
    #[arg(long, default_value_t = false, global = true)]
    local_embeddings: bool,

    /// Hosted embedding model
    #[arg(
        long,
        env = "OPENAI_EMBEDDING_MODEL",
        default_value = DEFAULT_EMBEDDING_MODEL,
        global = true
    )]
    embedding_model: String,

    /// Hosted chat model
    #[arg(long, env = "OPENAI_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL, global = true)]
    chat_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index, run an ad-hoc query, then a persisted build-or-load query.
    Demo {
        /// Query for the freshly built in-memory index
        #[arg(long, default_value = DEMO_ADHOC_QUERY)]
        adhoc_query: String,
        /// Query for the persisted index
        #[arg(long, default_value = DEMO_PERSISTED_QUERY)]
        persisted_query: String,
        /// Nearest neighbours retrieved for the ad-hoc query
        #[arg(long, default_value_t = DEFAULT_QUERY_TOP_K)]
        top_k: usize,
        /// Minimum similarity kept for the ad-hoc query
        #[arg(long, default_value_t = DEFAULT_SIMILARITY_CUTOFF)]
        similarity_cutoff: f64,
    },
    /// Build an in-memory index and answer one query with sources.
    Query {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_QUERY_TOP_K)]
        top_k: usize,
        #[arg(long, default_value_t = DEFAULT_SIMILARITY_CUTOFF)]
        similarity_cutoff: f64,
    },
    /// Answer one query from the persisted index, building it first if needed.
    Ask {
        #[arg(long)]
        query: String,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Demo {
            adhoc_query: DEMO_ADHOC_QUERY.to_string(),
            persisted_query: DEMO_PERSISTED_QUERY.to_string(),
            top_k: DEFAULT_QUERY_TOP_K,
            similarity_cutoff: DEFAULT_SIMILARITY_CUTOFF,
        }
    }
}

type DynOrchestrator = Orchestrator<dyn Embedder, dyn LanguageModel>;

fn build_orchestrator(cli: &Cli) -> anyhow::Result<DynOrchestrator> {
    let config = OpenAiConfig::from_env().context("invalid OPENAI_API_BASE")?;
    let client = OpenAiClient::new(config);

    let embedder: Arc<dyn Embedder> = if cli.local_embeddings {
        Arc::new(CharacterNgramEmbedder::default())
    } else {
        Arc::new(OpenAiEmbedder::new(client.clone()).with_model(&cli.embedding_model))
    };
    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChat::new(client).with_model(&cli.chat_model));

    Ok(Orchestrator::new(embedder, llm).with_options(PipelineOptions {
        recursive: cli.recursive,
        ..PipelineOptions::default()
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let mut cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-rag boot"
    );

    if setup_openai_api_key(cli.env_file.as_deref()).is_err() {
        warn!("continuing without a credential; hosted model calls will fail");
    }

    let orchestrator = build_orchestrator(&cli)?;
    let storage = FsIndexStorage::new(&cli.persist_dir);

    match cli.command.take().unwrap_or_default() {
        Command::Demo {
            adhoc_query,
            persisted_query,
            top_k,
            similarity_cutoff,
        } => {
            let mut failed_steps = Vec::new();

            match orchestrator
                .create_index_and_query_engine(&cli.documents)
                .await
            {
                Ok((index, _engine)) => {
                    let answered = orchestrator
                        .create_query_engine_and_query(
                            &adhoc_query,
                            &index,
                            top_k,
                            similarity_cutoff,
                        )
                        .await;
                    if answered.is_err() {
                        failed_steps.push("ad-hoc query");
                    }
                }
                Err(_) => {
                    warn!("skipping ad-hoc query because the index could not be built");
                    failed_steps.push("index build");
                }
            }

            if orchestrator
                .create_or_load_index_and_query(&persisted_query, &cli.documents, &storage)
                .await
                .is_err()
            {
                failed_steps.push("persisted query");
            }

            if !failed_steps.is_empty() {
                anyhow::bail!("demo steps failed: {}", failed_steps.join(", "));
            }
        }
        Command::Query {
            query,
            top_k,
            similarity_cutoff,
        } => {
            let (index, _engine) = orchestrator
                .create_index_and_query_engine(&cli.documents)
                .await?;
            orchestrator
                .create_query_engine_and_query(&query, &index, top_k, similarity_cutoff)
                .await?;
        }
        Command::Ask { query } => {
            orchestrator
                .create_or_load_index_and_query(&query, &cli.documents, &storage)
                .await?;
        }
    }

    Ok(())
}
