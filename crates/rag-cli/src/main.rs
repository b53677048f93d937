//! RAG CLI - Grounded question answering over a local document folder.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rag_app::components::{load_embedder, load_language_model, load_scorer};
use rag_app::eval::{load_questions, write_records};
use rag_app::{QueryOutcome, RagConfig, RagSession, RetrievalMode};
use rag_generate::CONTEXT_SEPARATOR;

/// Characters of chunk text shown per retrieval result.
const PREVIEW_CHARS: usize = 450;

/// rag - answer questions from your documents, and only from them
#[derive(Parser)]
#[command(name = "rag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/rag-ground/config.toml, then ./rag-ground.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask questions interactively
    Chat {
        /// File or directory of .pdf, .md and .txt documents
        #[arg(short, long)]
        docs: PathBuf,
    },

    /// Answer a single question
    Ask {
        /// File or directory of .pdf, .md and .txt documents
        #[arg(short, long)]
        docs: PathBuf,

        /// The question
        question: String,

        /// Print the answer and contexts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the ranked chunks for a question without generating an answer
    Retrieve {
        /// File or directory of .pdf, .md and .txt documents
        #[arg(short, long)]
        docs: PathBuf,

        /// The question
        question: String,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,
    },

    /// Answer a question set and write records for external scoring
    Eval {
        /// File or directory of .pdf, .md and .txt documents
        #[arg(short, long)]
        docs: PathBuf,

        /// JSON array of {question, ground_truth}
        #[arg(short, long)]
        questions: PathBuf,

        /// Output file, one JSON record per line
        #[arg(short, long)]
        output: PathBuf,

        /// Candidate sources: hybrid or dense (default: from config)
        #[arg(short, long)]
        mode: Option<RetrievalMode>,
    },

    /// Print the effective configuration
    Config,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&Path>) -> rag_core::Result<RagConfig> {
    match path {
        Some(path) => RagConfig::load(path),
        None => RagConfig::load_default(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Chat { docs } => {
            let session = open_session(config, &docs, true).await?;
            chat(&session).await?;
        }
        Commands::Ask {
            docs,
            question,
            json,
        } => {
            let session = open_session(config, &docs, true).await?;
            let outcome = session.ask(&question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.answer);
            }
        }
        Commands::Retrieve {
            docs,
            question,
            limit,
        } => {
            let session = open_session(config, &docs, false).await?;
            retrieve(&session, &question, limit).await?;
        }
        Commands::Eval {
            docs,
            questions,
            output,
            mode,
        } => {
            let mode = mode.unwrap_or(config.retrieval.mode);
            let questions = load_questions(&questions)?;
            let session = open_session(config, &docs, true).await?;

            println!("Running {} questions ({:?})...", questions.len(), mode);
            let records = session.evaluate(&questions, mode).await?;
            write_records(&output, &records)?;
            println!("Wrote {} records to {}", records.len(), output.display());
        }
    }

    Ok(())
}

/// Build the collaborators once and index the documents.
async fn open_session(
    config: RagConfig,
    docs: &Path,
    with_model: bool,
) -> Result<RagSession, Box<dyn std::error::Error>> {
    let embedder = load_embedder(&config.embedding)?;
    let scorer = load_scorer(&config.reranker)?;
    let model = if with_model {
        Some(load_language_model(&config.generation)?)
    } else {
        None
    };

    let mut session = RagSession::new(config, embedder, scorer)?;
    if let Some(model) = model {
        session = session.with_model(model)?;
    }

    let chunks = session.ingest_dir(docs).await?;
    let stats = session.stats()?;
    eprintln!(
        "Indexed {} chunks from {} documents ({} embeddings)",
        chunks, stats.documents, stats.embeddings
    );

    Ok(session)
}

async fn chat(session: &RagSession) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();

    loop {
        print!("\nAsk a question (or type 'exit'): ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match session.ask(question).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    Ok(())
}

fn print_outcome(outcome: &QueryOutcome) {
    println!("\n=== RETRIEVED CONTEXT ===");
    println!("{}", outcome.contexts.join(CONTEXT_SEPARATOR));

    println!("\n=== ANSWER ===");
    println!("{}", outcome.answer);
    if let Some(reason) = outcome.fallback {
        println!("({}, {}ms)", reason, outcome.latency_ms);
    } else {
        println!("({}ms)", outcome.latency_ms);
    }
}

async fn retrieve(
    session: &RagSession,
    question: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let ranked = session.retrieve(question, limit).await?;

    if ranked.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in ranked.iter().enumerate() {
        let chunk = &result.chunk;
        let page = chunk
            .page()
            .map(|p| format!(" page {}", p))
            .unwrap_or_default();

        println!("---\n[{}] {}{} (score: {:.3})", i + 1, chunk.source_doc(), page, result.score);
        println!("{}\n", preview(chunk.text(), PREVIEW_CHARS));
    }

    Ok(())
}

/// The first `max_chars` characters of `text`, marked when cut.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ééé", 2), "éé...");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "rag", "eval", "--docs", "data", "--questions", "q.json", "--output", "out.jsonl",
            "--mode", "dense",
        ])
        .unwrap();

        match cli.command {
            Commands::Eval { mode, .. } => assert_eq!(mode, Some(RetrievalMode::Dense)),
            _ => panic!("expected eval"),
        }
    }
}
