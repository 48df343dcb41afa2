//! # Interview Coach CLI (`coach`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `coach init` | Create the SQLite index |
//! | `coach add <path>` | Ingest a file or directory (txt, md, pdf) |
//! | `coach search "<query>"` | Ranked chunks for a query |
//! | `coach ask "<question>"` | One answer, optionally streamed |
//! | `coach chat` | Interactive multi-turn session |
//! | `coach docs list` | Indexed documents |
//! | `coach docs delete <id>` | Remove a document |
//! | `coach serve` | Start the HTTP API |
//! | `coach completions <shell>` | Shell completion script |
//!
//! All commands read `--config` (default `./config/coach.toml`). Without
//! that file, built-in defaults apply.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use futures::StreamExt;
use tokio::io::AsyncBufReadExt;

use interview_coach::acquisition::{self, SourceOptions};
use interview_coach::config::{self, Config};
use interview_coach::embedding::create_embedder;
use interview_coach::generate::StreamEvent;
use interview_coach::sqlite_store::SqliteVectorStore;
use interview_coach::{logging, server, Coach, CoachError};

/// Interview Coach: answers grounded in your own interview notes.
#[derive(Parser)]
#[command(
    name = "coach",
    about = "Interview Coach: retrieval-augmented interview preparation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/coach.toml")]
    config: PathBuf,

    /// Log verbosity when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite index. Safe to run repeatedly.
    Init,

    /// Ingest a file or every matching file below a directory.
    Add {
        path: PathBuf,
        /// Source label (defaults to the file name).
        #[arg(long)]
        source: Option<String>,
        /// Page URL the text came from.
        #[arg(long)]
        url: Option<String>,
        /// Document type, e.g. `web` or `resume`.
        #[arg(long)]
        kind: Option<String>,
        /// Glob of files to pick up from directories (repeatable).
        #[arg(long)]
        include: Vec<String>,
        /// Glob of files to skip in directories (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Search the knowledge base.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Ask a single question.
    Ask {
        question: String,
        /// Session to continue (a new one is created otherwise).
        #[arg(long)]
        session: Option<String>,
        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// Interactive multi-turn conversation on stdin.
    ///
    /// `/reset` starts over, `/exit` or end of input quits.
    Chat {
        #[arg(long)]
        session: Option<String>,
    },

    /// Manage indexed documents.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print a shell completion script.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum DocsAction {
    /// List indexed documents.
    List,
    /// Delete a document and all its chunks.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "coach", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&cfg).await?,
        Commands::Add {
            path,
            source,
            url,
            kind,
            include,
            exclude,
        } => {
            let options = SourceOptions { source, url, kind };
            run_add(&cfg, &path, &options, &include, &exclude).await?;
        }
        Commands::Search { query, limit } => run_search(&cfg, &query, limit).await?,
        Commands::Ask {
            question,
            session,
            stream,
        } => {
            let coach = Coach::from_config(&cfg).await?;
            if stream {
                stream_answer(&coach, &question, session.as_deref()).await?;
            } else {
                let answer = coach.generate(&question, session.as_deref()).await?;
                println!("{}", answer.text);
                eprintln!("session: {}", answer.session_id);
            }
        }
        Commands::Chat { session } => run_chat(&cfg, session).await?,
        Commands::Docs { action } => match action {
            DocsAction::List => run_docs_list(&cfg).await?,
            DocsAction::Delete { id } => {
                let coach = Coach::from_config(&cfg).await?;
                let removed = coach.delete_document(&id).await?;
                if removed == 0 {
                    bail!("Document not found: {}", id);
                }
                println!("Deleted {} ({} chunks).", id, removed);
            }
        },
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// A missing config file means defaults; a broken one is an error.
fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

async fn run_init(cfg: &Config) -> Result<()> {
    let embedder = create_embedder(&cfg.embedding)?;
    let store = SqliteVectorStore::open(&cfg.db.path, embedder).await?;
    store.pool().close().await;
    println!("Database initialized at {}.", cfg.db.path.display());
    Ok(())
}

async fn run_add(
    cfg: &Config,
    path: &Path,
    options: &SourceOptions,
    include: &[String],
    exclude: &[String],
) -> Result<()> {
    let documents = acquisition::acquire(path, options, include, exclude)?;
    if documents.is_empty() {
        bail!("No matching files under {}", path.display());
    }

    let coach = Coach::from_config(cfg).await?;
    let mut added = 0;
    for doc in documents {
        match coach.add_document(&doc.text, doc.metadata.clone()).await {
            Ok(id) => {
                added += 1;
                println!(
                    "Added {} ({}, {})",
                    id,
                    doc.metadata.get("source").map(String::as_str).unwrap_or("unknown"),
                    doc.metadata.get("type").map(String::as_str).unwrap_or("file"),
                );
            }
            Err(CoachError::EmptyContent) => {
                eprintln!("Skipped {}: no text content", doc.path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    if added == 0 {
        bail!("No documents added");
    }
    println!("{} document(s) added.", added);
    Ok(())
}

async fn run_search(cfg: &Config, query: &str, limit: usize) -> Result<()> {
    let coach = Coach::from_config(cfg).await?;
    let hits = coach.search_documents(query, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}{}",
            i + 1,
            hit.score,
            hit.meta("source").unwrap_or("unknown"),
            hit.meta("url").map(|u| format!(" <{}>", u)).unwrap_or_default(),
        );
        println!("   {}", snippet(&hit.text, 200));
    }
    Ok(())
}

async fn run_docs_list(cfg: &Config) -> Result<()> {
    let coach = Coach::from_config(cfg).await?;
    let docs = coach.list_documents().await?;
    if docs.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "{}  {:<8} {:>4} chunks  {}{}",
            doc.id,
            doc.kind,
            doc.chunk_count,
            doc.source,
            doc.url.map(|u| format!(" <{}>", u)).unwrap_or_default(),
        );
    }
    Ok(())
}

async fn run_chat(cfg: &Config, session: Option<String>) -> Result<()> {
    let coach = Coach::from_config(cfg).await?;
    let mut session = session;
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    prompt_marker()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/exit" | "/quit" => break,
            "/reset" => {
                if let Some(id) = session.take() {
                    coach.reset(&id);
                }
                println!("(new conversation)");
            }
            question => {
                let outcome = stream_answer(&coach, question, session.as_deref()).await;
                match outcome {
                    Ok(id) => session = Some(id),
                    Err(e) => eprintln!("error: {:#}", e),
                }
            }
        }
        prompt_marker()?;
    }
    Ok(())
}

fn prompt_marker() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

/// Prints fragments as they arrive and returns the session id.
async fn stream_answer(coach: &Coach, question: &str, session: Option<&str>) -> Result<String> {
    let mut events = coach.stream_generate(question, session);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Delta(text) => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::Done { session_id } => {
                writeln!(stdout)?;
                eprintln!("session: {}", session_id);
                return Ok(session_id);
            }
            StreamEvent::Failed(err) => {
                writeln!(stdout)?;
                return Err(err.into());
            }
        }
    }
    bail!("answer stream ended unexpectedly")
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
