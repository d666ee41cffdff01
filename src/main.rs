//! # Oráculo CLI (`oraculo`)
//!
//! The `oraculo` binary is the primary interface for the assistant. It
//! provides commands for initialization, one-shot questions, an
//! interactive chat loop, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! oraculo --config ./config/oraculo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oraculo init` | Create the SQLite database, data directories, and cache file |
//! | `oraculo ask "<question>"` | Resolve one question and print the answer |
//! | `oraculo chat` | Interactive question/answer loop on stdin |
//! | `oraculo serve` | Start the HTTP API (requires `ORACULO_SECRET`) |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use oraculo::{config, db, migrate, pipeline::Pipeline, server};

/// Oráculo CLI — a conversational assistant with a staged answer pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/oraculo.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "oraculo",
    about = "Oráculo — a conversational assistant backed by local corpora and live web search",
    version,
    long_about = "Oráculo resolves questions through a staged pipeline: a similarity cache of \
    prior answers, a curated training corpus, a self-updating learned corpus cross-checked \
    against live web search, and web search alone as the last resort."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/oraculo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and data layout.
    ///
    /// Creates the SQLite database with its tables (users, sessions,
    /// messages), the training and learned corpus directories, and an
    /// empty cache file. Idempotent — running it multiple times is safe.
    Init,

    /// Resolve a single question and print the answer.
    ///
    /// Runs the full pipeline without touching sessions; the source label
    /// and token usage are printed alongside the answer.
    Ask {
        /// The question to resolve.
        question: String,
    },

    /// Interactive chat loop on stdin.
    ///
    /// Each line is resolved independently through the pipeline. An empty
    /// line or EOF exits.
    Chat,

    /// Start the HTTP API server.
    ///
    /// Requires the `ORACULO_SECRET` environment variable for token
    /// signing. Binds to the address configured in `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            config::ensure_data_layout(&cfg)?;
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database and data layout initialized successfully.");
        }
        Commands::Ask { question } => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let resolution = pipeline.resolve(&question).await?;
            println!("{}", resolution.answer);
            println!(
                "[{} | tokens in={} out={} total={}]",
                resolution.source,
                resolution.token_usage.input,
                resolution.token_usage.output,
                resolution.token_usage.total
            );
        }
        Commands::Chat => {
            let pipeline = Pipeline::from_config(&cfg)?;
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                print!("> ");
                stdout.flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let question = line.trim();
                if question.is_empty() {
                    break;
                }
                match pipeline.resolve(question).await {
                    Ok(resolution) => {
                        println!("{} [{}]", resolution.answer, resolution.source)
                    }
                    Err(e) => eprintln!("error: {e:#}"),
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
