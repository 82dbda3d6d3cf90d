use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use coordination::debate::{DebateEvent, FnSink};
use coordination::{recover, AnalysisCache, Recovery, SharedEventSink};
use screening_agents::runner;
use screening_agents::{
    check_endpoint, BatchReport, DebateRunner, Document, OpenAiCompatClient, ScreeningConfig,
    StaticEvidenceSearch, Synthesis,
};
use serde::Serialize;
use tracing::{info, warn};

/// Screen documents against a research viewpoint with an analyst/reviewer debate
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (defaults plus SCREEN_* env overrides otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Debate every document and print the ranked JSON report
    Screen {
        /// Research viewpoint, or @path to read it from a file
        #[arg(long)]
        viewpoint: String,

        /// JSON array of {id?, title, text|abstract|content}
        #[arg(long)]
        documents: PathBuf,

        /// Cache file (overrides the configured path)
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Maximum review rounds per document
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Neither read nor write the analysis cache
        #[arg(long, default_value_t = false)]
        no_cache: bool,

        /// Stream debate events to stderr as JSON lines
        #[arg(long, default_value_t = false)]
        events: bool,

        /// Synthesize the accepted documents after screening
        #[arg(long, default_value_t = false)]
        synthesize: bool,

        /// JSON array of {title, snippet} used for follow-up evidence search
        #[arg(long)]
        evidence: Option<PathBuf>,
    },

    /// Print the structured analysis of a research viewpoint
    Viewpoint {
        /// Viewpoint text, or @path to read it from a file
        #[arg(long)]
        text: String,
    },

    /// Run the structured-output recovery parser over raw model text
    Recover {
        /// Read from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Remove every entry from the analysis cache
    CacheClear {
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Probe the model endpoint
    Check,
}

#[derive(Serialize)]
struct ScreenOutput<'a> {
    viewpoint: &'a str,
    #[serde(flatten)]
    report: &'a BatchReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    synthesis: Option<Synthesis>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ScreeningConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Screen {
            viewpoint,
            documents,
            cache,
            max_rounds,
            no_cache,
            events,
            synthesize,
            evidence,
        } => {
            let mut config = config;
            if let Some(max_rounds) = max_rounds {
                config.debate.max_rounds = max_rounds;
            }
            let viewpoint = text_or_file(&viewpoint)?;
            let documents = load_documents(&documents)?;
            let cache = if no_cache {
                None
            } else {
                open_cache(cache.or_else(|| config.cache_path.clone()))
            };
            let sink: Option<SharedEventSink> = events.then(|| {
                Arc::new(FnSink(|event: &DebateEvent| {
                    if let Ok(line) = serde_json::to_string(event) {
                        eprintln!("{line}");
                    }
                })) as SharedEventSink
            });

            let client = Arc::new(OpenAiCompatClient::new(config.endpoint.clone())?);
            let mut runner = DebateRunner::from_config(&config, client)
                .with_cache(cache)
                .with_sink(sink);
            if let Some(path) = evidence {
                let search = StaticEvidenceSearch::from_file(&path)?;
                info!(snippets = search.len(), "loaded evidence corpus");
                runner = runner.with_search(Arc::new(search));
            }

            info!(
                endpoint = %config.endpoint.url,
                model = %config.endpoint.model,
                documents = documents.len(),
                "screening starting"
            );
            let report = runner
                .screen_batch(&viewpoint, &documents, &config.batch)
                .await;
            let synthesis = if synthesize {
                runner
                    .synthesize(&viewpoint, &report.accepted, config.batch.synthesis_rounds)
                    .await
                    .synthesis
            } else {
                None
            };

            let output = ScreenOutput {
                viewpoint: &viewpoint,
                report: &report,
                synthesis,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Viewpoint { text } => {
            let text = text_or_file(&text)?;
            let client = Arc::new(OpenAiCompatClient::new(config.endpoint.clone())?);
            let runner = DebateRunner::from_config(&config, client);
            let analysis = runner.analyze_viewpoint(&text).await;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Recover { file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            match recover(&raw) {
                Recovery::Parsed { value, stage } => {
                    info!(%stage, "recovered structured output");
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                Recovery::Unparseable { preview } => {
                    bail!("unparseable model output: {preview}");
                }
            }
        }
        Command::CacheClear { cache } => match open_cache(cache.or(config.cache_path)) {
            Some(cache) => {
                let removed = cache.len();
                cache.clear();
                info!(removed, "cache cleared");
            }
            None => warn!("no cache path configured"),
        },
        Command::Check => {
            if check_endpoint(&config.endpoint.url).await {
                info!(url = %config.endpoint.url, "endpoint reachable");
            } else {
                bail!("endpoint unreachable: {}", config.endpoint.url);
            }
        }
    }

    Ok(())
}

/// `@path` reads the file, anything else is taken literally.
fn text_or_file(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {path}")),
        None => Ok(arg.to_string()),
    }
}

fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents {}", path.display()))?;
    let documents: Vec<Document> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents {}", path.display()))?;
    if documents.is_empty() {
        bail!("no documents in {}", path.display());
    }
    Ok(documents)
}

/// A missing or corrupt cache file opens empty.
fn open_cache(path: Option<PathBuf>) -> Option<Arc<AnalysisCache>> {
    path.map(|path| Arc::new(runner::open_cache(path)))
}
