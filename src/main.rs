//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask` | Index files and answer one question |
//! | `docqa session` | Interactive question answering with history |
//! | `docqa chunks <dir>` | Count the chunks a folder would produce |
//! | `docqa chat` | Multi-conversation chat with streamed replies |
//! | `docqa complete "<prompt>"` | One-shot completion |
//! | `docqa recipe` | Generate recipes from ingredients |
//! | `docqa serve` | Start the HTTP API |
//! | `docqa completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! # Ask about a handbook, with page citations
//! docqa ask --file handbook.pdf "How many vacation days do I get?"
//!
//! # Load a folder and keep asking
//! docqa session ./docs --recursive
//!
//! # Check chunk counts before embedding anything
//! docqa chunks ./docs
//! ```
//!
//! API keys are read from the environment; a `.env` file in the working
//! directory is loaded first.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use docqa::config;
use docqa::progress::ProgressMode;
use docqa::recipe::RecipeRequest;
use docqa_core::prompt::AnswerStyle;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// docqa — question answering over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docqa.example.toml` for a full example. A missing file
/// means built-in defaults.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "docqa — question answering over your own PDF and text documents",
    version,
    long_about = "docqa indexes PDF and text documents into an in-memory vector index \
    and answers questions about them with a hosted chat model, citing the files and pages \
    the answer came from."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents and answer a single question.
    Ask {
        /// The question to answer.
        question: String,

        /// PDF or TXT file, or a folder of them. Repeatable.
        #[arg(long = "file", short = 'f', required = true)]
        files: Vec<PathBuf>,

        /// Descend into subfolders.
        #[arg(long)]
        recursive: bool,

        /// Answer length: `concise` or `detailed`.
        #[arg(long)]
        style: Option<AnswerStyle>,

        /// Index build progress on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Print the history entry as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive session: load documents, ask questions, browse history.
    Session {
        /// Files or folders to index at startup.
        paths: Vec<PathBuf>,

        #[arg(long)]
        recursive: bool,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Count the chunks each document in a folder would produce.
    ///
    /// Uses the configured chunk size and overlap. Nothing is embedded.
    Chunks {
        dir: PathBuf,

        #[arg(long)]
        recursive: bool,
    },

    /// Chat with the configured model. Conversations are saved to
    /// `[chat].history_path`.
    Chat {
        /// Model id, overriding `[llm].model`.
        #[arg(long)]
        model: Option<String>,
    },

    /// Send one prompt and print the reply.
    Complete {
        prompt: String,

        /// Optional system message.
        #[arg(long)]
        system: Option<String>,

        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,

        #[arg(long)]
        model: Option<String>,
    },

    /// Generate recipes from a list of main ingredients.
    Recipe {
        /// Comma-separated main ingredients.
        #[arg(long)]
        ingredients: String,

        /// Number of recipes (1-5).
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=5))]
        count: u32,

        /// Dietary restriction, or `none`.
        #[arg(long, default_value = "none")]
        diet: String,

        /// `Any`, `Easy`, `Medium` or `Hard`.
        #[arg(long, default_value = "Any")]
        difficulty: String,

        /// Servings per recipe (1-12).
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=12))]
        servings: u32,

        /// Print the parsed recipes as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docqa=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "docqa", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            files,
            recursive,
            style,
            progress,
            json,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            docqa::session_cmd::run_ask(&cfg, &files, recursive, &question, style, progress, json)
                .await?;
        }
        Commands::Session {
            paths,
            recursive,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            docqa::session_cmd::run_session(&cfg, &paths, recursive, progress).await?;
        }
        Commands::Chunks { dir, recursive } => {
            docqa::stats::run_chunks(&cfg, &dir, recursive)?;
        }
        Commands::Chat { model } => {
            docqa::chat_cmd::run_chat(&cfg, model).await?;
        }
        Commands::Complete {
            prompt,
            system,
            stream,
            model,
        } => {
            docqa::chat_cmd::run_complete(&cfg, &prompt, system.as_deref(), stream, model).await?;
        }
        Commands::Recipe {
            ingredients,
            count,
            diet,
            difficulty,
            servings,
            json,
        } => {
            let req = RecipeRequest {
                ingredients,
                count,
                diet,
                difficulty,
                servings,
            };
            docqa::recipe::run_recipe(&cfg, &req, json).await?;
        }
        Commands::Serve => {
            docqa::server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
