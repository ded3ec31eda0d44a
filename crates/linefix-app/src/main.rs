//! linefix - ask an LLM for line-level fixes and apply them.
//!
//! Subcommands: `fix` (one file), `chunk` / `summarize` (a source tree),
//! `serve` (the web service) and `config` (saved settings).

mod corpus;
mod fix;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use linefix_adapters::Config;
use linefix_engine::chunk::DEFAULT_GLOB;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "linefix",
    about = "Line-level code fixes from Gemini",
    long_about = "Sends source code to Gemini, asks for a small set of line edits\n\
                  as JSON, and applies them. Also chunks and summarises code trees\n\
                  and serves a web client.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Propose fixes for a file (dry run unless --apply)
    Fix {
        /// Path to the file to fix
        target: PathBuf,

        /// Write the edits back to the file
        #[arg(long)]
        apply: bool,

        /// Model to try first (default from config, gemini-1.5-pro-latest)
        #[arg(long)]
        model: Option<String>,

        /// Timeout in seconds for each model call
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Split source files into chunks and show the first one
    Chunk {
        /// Root directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long, default_value_t = 2000)]
        chunk_size: usize,

        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,

        #[arg(long, default_value = DEFAULT_GLOB)]
        glob: String,
    },

    /// Summarise every chunk of a code tree into a JSON index
    Summarize {
        /// Root directory of the codebase
        directory: PathBuf,

        #[arg(long, default_value = DEFAULT_GLOB)]
        glob: String,

        #[arg(long, default_value_t = 3000)]
        chunk_size: usize,

        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,

        /// Read at most this many files
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value = "summary_index.json")]
        out: PathBuf,
    },

    /// Run the web service
    Serve {
        #[arg(long)]
        port: Option<u16>,

        /// Directory holding index.html and other static assets
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Show the saved settings, or change them with the flags below
    Config {
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        fallback_model: Option<String>,

        #[arg(long)]
        server_model: Option<String>,

        #[arg(long)]
        timeout: Option<u64>,

        #[arg(long)]
        port: Option<u16>,

        /// Interpreter used by the web service to run snippets
        #[arg(long)]
        python: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linefix=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::load();
    tracing::debug!(config = %Config::config_location(), "loaded configuration");

    match cli.command {
        Command::Fix {
            target,
            apply,
            model,
            timeout,
        } => {
            fix::run(
                &config,
                fix::FixArgs {
                    target,
                    apply,
                    model,
                    timeout,
                },
            )
            .await
        }
        Command::Chunk {
            path,
            chunk_size,
            chunk_overlap,
            glob,
        } => corpus::run_chunk(
            &path,
            &glob,
            chunk_size,
            chunk_overlap,
            &mut std::io::stdout().lock(),
        ),
        Command::Summarize {
            directory,
            glob,
            chunk_size,
            chunk_overlap,
            limit,
            out,
        } => {
            corpus::run_summarize(
                &config,
                corpus::SummarizeArgs {
                    directory,
                    glob,
                    chunk_size,
                    chunk_overlap,
                    limit,
                    out,
                },
            )
            .await
        }
        Command::Serve { port, static_dir } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(static_dir) = static_dir {
                config.static_dir = static_dir;
            }
            let project_root = std::env::current_dir()?;
            let state = linefix_server::AppState::from_config(&config, &project_root)?;
            linefix_server::serve(state, config.port).await
        }
        Command::Config {
            api_key,
            model,
            fallback_model,
            server_model,
            timeout,
            port,
            python,
        } => settings::run(settings::ConfigUpdate {
            api_key,
            model,
            fallback_model,
            server_model,
            timeout_secs: timeout,
            port,
            python,
        }),
    }
}
