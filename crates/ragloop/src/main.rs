//! # ragloop CLI
//!
//! Command-line driver for ragloop, a minimal retrieval-augmented generation
//! loop: ingest a document into a Chroma collection using Ollama embeddings,
//! then answer questions with a chat model grounded in the nearest chunks.
//!
//! ## Commands
//!
//! - `ragloop ingest <PATH>` - Chunk, embed and store a document
//! - `ragloop ask <QUESTION>` - Answer one question
//! - `ragloop chat` - Interactive question loop
//! - `ragloop collections` - List collections
//! - `ragloop config show|init|path` - Inspect configuration
//!
//! ## Examples
//!
//! ```bash
//! ragloop ingest data/background-data.txt
//! ragloop ask "Who is Don Ni?"
//! ragloop --format json ask "Who is Natali?"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use ragloop_chat::ChatSession;
use ragloop_chunker::LineChunker;
use ragloop_core::{
    EmbeddingBackend, ModelRegistry, ProvisionUpdate, RetrievalResult, Transcript, VectorStore,
};
use ragloop_embed::{EmbeddingProvider, NoopBackend};
use ragloop_ollama::{OllamaChat, OllamaClient};
use ragloop_query::RagPipeline;
use ragloop_store::{ChromaBackend, CollectionStore};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::{Config, EmbeddingBackendKind};

#[derive(Parser)]
#[command(name = "ragloop")]
#[command(about = "Ask questions grounded in a document")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/ragloop/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and store a document
    Ingest {
        /// Document to ingest
        path: PathBuf,

        /// Maximum estimated tokens per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Target collection
        #[arg(long)]
        collection: Option<String>,

        /// Description stored with every record
        #[arg(long)]
        description: Option<String>,
    },

    /// Answer a single question
    Ask {
        /// Question to answer
        question: String,

        /// Collection to retrieve from
        #[arg(long)]
        collection: Option<String>,

        /// Grounding chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Ask questions until told to stop
    Chat {
        /// Collection to retrieve from
        #[arg(long)]
        collection: Option<String>,
    },

    /// List collections on the vector store
    Collections,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for an answered question.
#[derive(Serialize)]
struct AnswerOutput {
    question: String,
    grounding: Vec<GroundingItem>,
    answer: String,
}

#[derive(Serialize)]
struct GroundingItem {
    id: String,
    distance: f32,
    text: String,
}

impl From<&RetrievalResult> for GroundingItem {
    fn from(result: &RetrievalResult) -> Self {
        Self {
            id: result.record.id.clone(),
            distance: result.distance,
            text: result.record.text.clone(),
        }
    }
}

/// Backend clients and the pipeline built over them.
struct Components {
    ollama: OllamaClient,
    embedder: Arc<EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    pipeline: RagPipeline,
}

impl Components {
    fn new(config: &Config) -> Self {
        let ollama = OllamaClient::new(&config.backend.ollama_url);
        let backend: Arc<dyn EmbeddingBackend> = match config.backend.embedding_backend {
            EmbeddingBackendKind::Ollama => Arc::new(ollama.clone()),
            EmbeddingBackendKind::Noop => {
                warn!("Using the noop embedding backend; retrieval order is arbitrary");
                Arc::new(NoopBackend::new())
            }
        };
        let embedder = Arc::new(EmbeddingProvider::new(backend, &config.models.embedding));
        let store: Arc<dyn VectorStore> = Arc::new(CollectionStore::new(ChromaBackend::new(
            &config.backend.chroma_url,
        )));
        let pipeline =
            RagPipeline::new(Arc::new(LineChunker::new()), embedder.clone(), store.clone())
                .with_grounding_prefix(&config.chat.grounding_prefix)
                .with_record_embedding(config.query.record_embedding);

        Self {
            ollama,
            embedder,
            store,
            pipeline,
        }
    }

    fn chat_session(&self, config: &Config) -> ChatSession {
        let chat = OllamaChat::new(self.ollama.clone(), &config.models.chat);
        ChatSession::new(
            Arc::new(self.ollama.clone()) as Arc<dyn ModelRegistry>,
            Box::new(chat),
        )
    }
}

/// Log model pull progress until the sender side goes away.
fn report_progress(
    mut updates: broadcast::Receiver<ProvisionUpdate>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    info!("Pulling {}: {:.0}% ({})", update.model, update.percent, update.status);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} progress updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        Config::load_from(Some(path.clone()))
            .context(format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load().context("Failed to load config")?
    };

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config
            .logging
            .level
            .parse::<Level>()
            .with_context(|| format!("Invalid log level {:?}", config.logging.level))?
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Ingest {
            path,
            chunk_size,
            collection,
            description,
        } => {
            if !path.exists() {
                anyhow::bail!("Document does not exist: {}", path.display());
            }

            let components = Components::new(&config);
            let progress = report_progress(components.embedder.subscribe());
            let collection = collection.unwrap_or(config.ingest.collection);

            let report = components
                .pipeline
                .ingest_document(
                    &path,
                    chunk_size.unwrap_or(config.ingest.chunk_size),
                    &collection,
                    description.as_deref().unwrap_or(&config.ingest.description),
                    &cancel,
                )
                .await
                .context("Failed to ingest document")?;
            progress.abort();

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Text => {
                    for id in &report.upserted_ids {
                        println!("{id}");
                    }
                    println!("Ingested {} chunks into {}", report.chunks, collection);
                }
            }
        }

        Commands::Ask {
            question,
            collection,
            top_k,
        } => {
            let components = Components::new(&config);
            let mut session = components.chat_session(&config);
            let progress = (
                report_progress(components.embedder.subscribe()),
                report_progress(session.subscribe()),
            );

            let mut transcript = Transcript::new();
            transcript.add_system_message(&config.chat.system_prompt);

            let collection = collection.unwrap_or_else(|| config.ingest.collection.clone());
            let k = top_k.unwrap_or(config.query.top_k);
            answer(
                &components.pipeline,
                &mut session,
                &mut transcript,
                &question,
                &collection,
                k,
                cli.format,
                &cancel,
            )
            .await?;
            progress.0.abort();
            progress.1.abort();
        }

        Commands::Chat { collection } => {
            let components = Components::new(&config);
            let mut session = components.chat_session(&config);
            let progress = (
                report_progress(components.embedder.subscribe()),
                report_progress(session.subscribe()),
            );

            let mut transcript = Transcript::new();
            transcript.add_system_message(&config.chat.system_prompt);
            session
                .init(&transcript, &cancel)
                .await
                .context("Failed to start chat session")?;

            let collection = collection.unwrap_or_else(|| config.ingest.collection.clone());
            let mut input = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let Some(question) = read_line(&mut input).await? else {
                    break;
                };
                answer(
                    &components.pipeline,
                    &mut session,
                    &mut transcript,
                    &question,
                    &collection,
                    config.query.top_k,
                    cli.format,
                    &cancel,
                )
                .await?;

                println!("\n\nDo you wish to exit? [Y/N]");
                let reply = read_line(&mut input).await?.unwrap_or_default();
                if reply.trim().eq_ignore_ascii_case("y") {
                    break;
                }
            }
            progress.0.abort();
            progress.1.abort();
        }

        Commands::Collections => {
            let components = Components::new(&config);
            let names: Vec<String> = components
                .store
                .list_collections(&cancel)
                .try_collect()
                .await
                .context("Failed to list collections")?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&names)?);
                }
                OutputFormat::Text => {
                    if names.is_empty() {
                        println!("No collections.");
                    }
                    for name in names {
                        println!("{name}");
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

/// Next line of stdin, `None` at end of input.
async fn read_line(input: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    input.next_line().await.context("Failed to read stdin")
}

/// Retrieve grounding for `question` and print the streamed answer.
#[allow(clippy::too_many_arguments)]
async fn answer(
    pipeline: &RagPipeline,
    session: &mut ChatSession,
    transcript: &mut Transcript,
    question: &str,
    collection: &str,
    k: usize,
    format: OutputFormat,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut answer = pipeline
        .ask_question(session, transcript, question, collection, k, cancel)
        .await
        .context("Failed to retrieve grounding")?;

    match format {
        OutputFormat::Json => {
            let mut reply = String::new();
            while let Some(fragment) = answer.fragments.next().await {
                reply.push_str(&fragment.context("Chat completion failed")?);
            }
            let output = AnswerOutput {
                question: question.to_string(),
                grounding: answer.grounding.iter().map(GroundingItem::from).collect(),
                answer: reply,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for result in &answer.grounding {
                println!("INFO: {}", result.record.text);
            }
            print!("\n\nResponse: ");
            let mut stdout = std::io::stdout();
            while let Some(fragment) = answer.fragments.next().await {
                print!("{}", fragment.context("Chat completion failed")?);
                stdout.flush().context("Failed to flush stdout")?;
            }
            println!();
        }
    }
    Ok(())
}
