//! # docchat CLI
//!
//! Manage the document collection and chat with it from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat docs add <PATH>...` | Ingest files or directories |
//! | `docchat docs delete <NAME>...` | Remove documents and their chunks |
//! | `docchat docs list` | List stored documents |
//! | `docchat chat new <NAME>` | Create an empty chat |
//! | `docchat chat delete <NAME>` | Delete a chat and its history |
//! | `docchat chat list` | List chats, oldest first |
//! | `docchat chat show [NAME]` | Print a chat's history |
//! | `docchat chat ask [--chat NAME] <QUESTION>` | One streamed turn |
//! | `docchat chat repl [NAME]` | Interactive chat |
//! | `docchat keys set <embedding\|generation> <VALUE>` | Store an API key in `.env` |
//!
//! Commands that take an optional chat name default to the most recently
//! created chat. Logs go to stderr (`RUST_LOG`, default `docchat=info`);
//! answers go to stdout.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docchat::app::{self, ChatServices};
use docchat::chats::ChatDirectory;
use docchat::config::{self, Config};
use docchat::ingest::{self, FileOutcome};
use docchat::orchestrator::SessionOrchestrator;
use docchat_core::Error;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// docchat: chat with your documents across multiple saved conversations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docchat.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the document collection.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },
    /// Create, inspect, and talk to chats.
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    /// Manage provider API keys.
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
}

#[derive(Subcommand)]
enum DocsAction {
    /// Add files (PDF or text) or directories of them.
    ///
    /// Each file is stored under its file name. A name that already
    /// exists is reported and skipped; the other files are still added.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete documents by name. Unknown names fail the whole call.
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// List stored documents with their chunk counts.
    List,
}

#[derive(Subcommand)]
enum ChatAction {
    /// Create an empty chat.
    New { name: String },
    /// Delete a chat and its history file.
    Delete { name: String },
    /// List chats in creation order.
    List,
    /// Print a chat's messages.
    Show { name: Option<String> },
    /// Ask one question and stream the answer.
    Ask {
        /// Chat to use (defaults to the most recent one).
        #[arg(long)]
        chat: Option<String>,
        question: String,
    },
    /// Interactive chat. An empty line or EOF exits.
    Repl { name: Option<String> },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Write an API key into the dotenv file.
    Set {
        provider: KeyKind,
        value: String,
        /// Dotenv file to update.
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyKind {
    Embedding,
    Generation,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docchat=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        if let Some(Error::MissingCredential(vars)) = err.downcast_ref::<Error>() {
            eprintln!("Chat is disabled: {} not set.", vars.join(" and "));
            eprintln!("Set them with `docchat keys set <embedding|generation> <VALUE>`.");
        } else {
            eprintln!("Error: {:#}", err);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Keys can be set before a full config exists.
    if let Commands::Keys {
        action:
            KeysAction::Set {
                provider,
                value,
                env_file,
            },
    } = &cli.command
    {
        return set_key(&cli.config, *provider, value, env_file).await;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Docs { action } => run_docs(&cfg, action).await,
        Commands::Chat { action } => run_chat(&cfg, action).await,
        Commands::Keys { .. } => Ok(()),
    }
}

async fn set_key(config_path: &Path, kind: KeyKind, value: &str, env_file: &Path) -> Result<()> {
    let cfg = config::load_config(config_path).ok();
    let var = match kind {
        KeyKind::Embedding => cfg
            .map(|c| c.embedding.api_key_env)
            .unwrap_or_else(|| config::EmbeddingConfig::default().api_key_env),
        KeyKind::Generation => cfg
            .map(|c| c.generation.api_key_env)
            .unwrap_or_else(|| config::GenerationConfig::default().api_key_env),
    };
    if value.trim().is_empty() {
        bail!("{} must not be empty", var);
    }
    config::set_env_key(env_file, &var, value.trim()).await?;
    println!("Saved {} to {}", var, env_file.display());
    Ok(())
}

async fn run_docs(cfg: &Config, action: DocsAction) -> Result<()> {
    let store = app::open_store(cfg, app::embedder(cfg)?).await?;
    match action {
        DocsAction::Add { paths } => {
            let report = ingest::add_files(&store, &cfg.chunking, &paths).await?;
            for outcome in &report.outcomes {
                match outcome {
                    FileOutcome::Added { name, chunks } => {
                        println!("added   {} ({} chunks)", name, chunks)
                    }
                    FileOutcome::Failed { path, error } => {
                        println!("failed  {}: {:#}", path.display(), error)
                    }
                }
            }
            println!("{} added, {} failed", report.added(), report.failed());
            if report.failed() > 0 {
                bail!("{} file(s) were not added", report.failed());
            }
        }
        DocsAction::Delete { names } => {
            store.delete(&names).await?;
            for name in &names {
                println!("deleted {}", name);
            }
        }
        DocsAction::List => {
            let docs = store.list().await;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!("{}\t{} chunks", doc.name, doc.chunks);
            }
        }
    }
    Ok(())
}

async fn run_chat(cfg: &Config, action: ChatAction) -> Result<()> {
    let mut chats = ChatDirectory::open(&cfg.paths).await?;
    match action {
        ChatAction::New { name } => {
            let name = name.trim();
            if name.is_empty() {
                bail!("chat name must not be empty");
            }
            let path = chats.create(name).await?;
            println!("Created chat '{}' ({})", name, path.display());
        }
        ChatAction::Delete { name } => {
            chats.delete(&name).await?;
            println!("Deleted chat '{}'", name);
        }
        ChatAction::List => {
            if chats.list().is_empty() {
                println!("No chats. Create one with `docchat chat new <NAME>`.");
            }
            for entry in chats.list() {
                println!("{}\t{}", entry.session_id, entry.path.display());
            }
        }
        ChatAction::Show { name } => {
            let name = pick_chat(&chats, name)?;
            let (memory, _) = chats.open_memory(&name).await?;
            if let Some(history) = memory.history(&name) {
                for message in history.messages() {
                    println!("{}: {}\n", message.role.label(), message.content);
                }
            }
        }
        ChatAction::Ask { chat, question } => {
            let services = ChatServices::from_config(cfg).await?;
            let name = pick_chat(&chats, chat)?;
            let (memory, _) = chats.open_memory(&name).await?;
            let mut session = services.orchestrator(&name, memory);
            stream_turn(&mut session, &question).await?;
        }
        ChatAction::Repl { name } => {
            let services = ChatServices::from_config(cfg).await?;
            let name = pick_chat(&chats, name)?;
            let (memory, _) = chats.open_memory(&name).await?;
            let mut session = services.orchestrator(&name, memory);
            repl(&mut session).await?;
        }
    }
    Ok(())
}

fn pick_chat(chats: &ChatDirectory, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => {
            if chats.path(&name).is_none() {
                return Err(Error::UnknownSession(name).into());
            }
            Ok(name)
        }
        None => chats
            .latest()
            .map(|e| e.session_id.clone())
            .context("No chats yet. Create one with `docchat chat new <NAME>`."),
    }
}

/// Print fragments as they arrive. A persistence failure after the answer
/// was printed is reported separately.
async fn stream_turn(session: &mut SessionOrchestrator, question: &str) -> Result<()> {
    let stream = session.run(question);
    futures::pin_mut!(stream);
    let mut stdout = std::io::stdout();
    let mut printed = false;
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                stdout.write_all(fragment.as_bytes())?;
                stdout.flush()?;
                printed = true;
            }
            Err(e) => {
                if printed {
                    println!();
                }
                if e.is_persistence_failure() {
                    return Err(e).context("Answer generated but not saved");
                }
                return Err(e.into());
            }
        }
    }
    println!();
    Ok(())
}

async fn repl(session: &mut SessionOrchestrator) -> Result<()> {
    eprintln!(
        "Chatting in '{}'. Empty line or Ctrl-D to quit.",
        session.session_id()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Err(e) = stream_turn(session, line).await {
            eprintln!("Error: {:#}", e);
        }
    }
    Ok(())
}
