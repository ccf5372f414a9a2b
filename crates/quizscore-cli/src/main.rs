//! quizscore CLI: score quiz answers from the command line.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(
    name = "quizscore",
    version,
    about = "Psychological quiz scoring and classification"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one answer set
    Score {
        /// Test definition (.json or .toml)
        #[arg(long)]
        test: PathBuf,

        /// Answer file (.json or .toml)
        #[arg(long)]
        answers: PathBuf,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,

        /// Persist the result into this record directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Session ID to record the result under
        #[arg(long)]
        session: Option<Uuid>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score every answer file in a directory
    Batch {
        /// Test definition (.json or .toml)
        #[arg(long)]
        test: PathBuf,

        /// Directory of answer files
        #[arg(long)]
        answers_dir: PathBuf,

        /// Max concurrent submissions
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output directory for the batch report
        #[arg(long)]
        output: Option<PathBuf>,

        /// Persist every result into this record directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Lint test definition files
    Validate {
        /// Path to a test definition file or directory
        #[arg(long)]
        test: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print a stored scoring record
    Show {
        /// Record directory (defaults to store_dir from config)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Session ID of the record
        #[arg(long)]
        session: Uuid,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example quiz
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quizscore=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Score {
            test,
            answers,
            format,
            store,
            session,
            config,
        } => commands::score::execute(test, answers, format, store, session, config).await,
        Commands::Batch {
            test,
            answers_dir,
            parallelism,
            output,
            store,
            config,
        } => {
            commands::batch::execute(test, answers_dir, parallelism, output, store, config).await
        }
        Commands::Validate { test, config } => commands::validate::execute(test, config),
        Commands::Show {
            store,
            session,
            format,
            config,
        } => commands::show::execute(store, session, format, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
