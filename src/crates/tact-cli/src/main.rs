//! tact command-line front-end.
//!
//! Thin glue over `tact-core`: build an action index from a descriptions
//! file, resolve queries against it, and run the bundled calculator demo.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use llm::config::{LocalLlmConfig, RemoteLlmConfig};
use llm::local::{OllamaClient, OllamaEmbeddings};
use llm::recognizer::HttpRecognizer;
use llm::remote::{OpenAiClient, OpenAiEmbeddings};
use tact_core::{
    build_action_index, ActionResolver, Catalogue, CompletionModel, EmbeddingModel,
    ExecutorRegistry, LlmExtractor, NerExtractor, ParameterExtractor, ResolverConfig,
    VectorIndex, DEFAULT_THRESHOLD, DEFAULT_TOP_K,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    /// Local Ollama server.
    Ollama,
    /// OpenAI-compatible API (reads OPENAI_API_KEY).
    Openai,
}

#[derive(Parser)]
#[command(name = "tact", version, about = "Map free-text queries to callable actions")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model provider for completions and embeddings.
    #[arg(long, value_enum, default_value_t = Provider::Ollama, global = true)]
    provider: Provider,

    /// Base URL of the provider API.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Chat model identifier.
    #[arg(long, default_value = "llama3", global = true)]
    model: String,

    /// Embedding model identifier.
    #[arg(long, default_value = "nomic-embed-text", global = true)]
    embedding_model: String,

    /// Embedding vector dimensionality.
    #[arg(long, default_value_t = 768, global = true)]
    embedding_dimension: usize,

    /// NER sidecar endpoint. When set, parameter extraction is
    /// recognition-driven with LLM fallback instead of LLM-only.
    #[arg(long, global = true)]
    ner_url: Option<String>,

    /// Split raw queries into sub-intents before retrieval.
    #[arg(long, global = true)]
    decompose: bool,

    /// Application domain hint for the decomposition prompt.
    #[arg(long, default_value = "", global = true)]
    context: String,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a descriptions file into an index file.
    Index {
        /// Path to descriptions.json.
        descriptions: PathBuf,
        /// Where to write the index.
        #[arg(short, long, default_value = "index.json")]
        output: PathBuf,
    },
    /// Resolve a query to actions with extracted arguments.
    Resolve {
        /// The query text.
        query: String,
        /// Path to descriptions.json.
        #[arg(long)]
        descriptions: PathBuf,
        /// Path to a previously built index.
        #[arg(long)]
        index: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },
    /// Resolve and execute against the built-in calculator actions.
    Run {
        /// The query text.
        query: String,
        /// Path to descriptions.json.
        #[arg(long, default_value = "demos/calculator/descriptions.json")]
        descriptions: PathBuf,
        /// Path to a previously built index.
        #[arg(long, default_value = "demos/calculator/index.json")]
        index: PathBuf,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let (completion, embedder) = collaborators(&cli)?;

    match &cli.command {
        Command::Index {
            descriptions,
            output,
        } => {
            tact_core::create_action_embeddings(descriptions, output, embedder.as_ref())
                .await
                .context("building action embeddings")?;
            println!("wrote {}", output.display());
        }
        Command::Resolve {
            query,
            descriptions,
            index,
            top_k,
            threshold,
        } => {
            let resolver = build_resolver(&cli, descriptions, index, completion, embedder)?;
            let resolved = resolver
                .extract_actions_with_args(query, *top_k, *threshold)
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Command::Run {
            query,
            descriptions,
            index,
            top_k,
            threshold,
        } => {
            let resolver = build_resolver(&cli, descriptions, index, completion, embedder)?
                .with_executors(Arc::new(calculator_registry()));
            let report = resolver.run(query, *top_k, *threshold).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn collaborators(cli: &Cli) -> Result<(Arc<dyn CompletionModel>, Arc<dyn EmbeddingModel>)> {
    match cli.provider {
        Provider::Ollama => {
            let base = cli
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            let chat = LocalLlmConfig::new(&base, &cli.model);
            let embed = LocalLlmConfig::new(&base, &cli.embedding_model);
            Ok((
                Arc::new(OllamaClient::new(chat)),
                Arc::new(OllamaEmbeddings::new(embed, cli.embedding_dimension)),
            ))
        }
        Provider::Openai => {
            let base = cli
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            let chat = RemoteLlmConfig::from_env("OPENAI_API_KEY", &base, &cli.model)?;
            let embed = RemoteLlmConfig::from_env("OPENAI_API_KEY", &base, &cli.embedding_model)?;
            Ok((
                Arc::new(OpenAiClient::new(chat)),
                Arc::new(OpenAiEmbeddings::new(embed, cli.embedding_dimension)),
            ))
        }
    }
}

fn build_resolver(
    cli: &Cli,
    descriptions: &PathBuf,
    index: &PathBuf,
    completion: Arc<dyn CompletionModel>,
    embedder: Arc<dyn EmbeddingModel>,
) -> Result<ActionResolver> {
    let catalogue = Catalogue::from_json_file(descriptions)
        .with_context(|| format!("loading {}", descriptions.display()))?;
    catalogue.validate()?;
    let index =
        VectorIndex::load(index).with_context(|| format!("loading {}", index.display()))?;

    let extractor: Arc<dyn ParameterExtractor> = match &cli.ner_url {
        Some(url) => Arc::new(NerExtractor::new(
            Arc::new(HttpRecognizer::new(url)),
            completion.clone(),
        )),
        None => Arc::new(LlmExtractor::new(completion.clone())),
    };

    let config = ResolverConfig::new()
        .with_decomposition(cli.decompose)
        .with_application_context(&cli.context);

    Ok(ActionResolver::new(
        Arc::new(catalogue),
        Arc::new(index),
        embedder,
        completion,
        extractor,
    )
    .with_config(config))
}

/// A numeric argument may arrive as a bare number or a `{"value": …}`
/// payload, depending on the extraction strategy.
fn number(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("non-finite number {n}")),
        Value::Object(map) => match map.get("value") {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("non-finite number {n}")),
            _ => Err(format!("no numeric value in {value}")),
        },
        other => Err(format!("expected a number, got {other}")),
    }
}

fn numbers(value: &Value) -> std::result::Result<Vec<f64>, String> {
    match value {
        Value::Array(items) => items.iter().map(number).collect(),
        other => Ok(vec![number(other)?]),
    }
}

fn calculator_registry() -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    registry.register(
        "add",
        Arc::new(|args| {
            Box::pin(async move {
                let values = numbers(&args["values"])?;
                Ok(json!(values.iter().sum::<f64>()))
            })
        }),
    );
    registry.register(
        "subtract",
        Arc::new(|args| {
            Box::pin(async move {
                let a = number(&args["a"])?;
                let b = number(&args["b"])?;
                Ok(json!(a - b))
            })
        }),
    );
    registry.register(
        "multiply",
        Arc::new(|args| {
            Box::pin(async move {
                let values = numbers(&args["values"])?;
                Ok(json!(values.iter().product::<f64>()))
            })
        }),
    );
    registry.register(
        "divide",
        Arc::new(|args| {
            Box::pin(async move {
                let a = number(&args["a"])?;
                let b = number(&args["b"])?;
                if b == 0.0 {
                    return Err("division by zero".to_string());
                }
                Ok(json!(a / b))
            })
        }),
    );
    registry
}
