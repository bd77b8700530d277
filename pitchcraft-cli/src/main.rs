mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pitchcraft", version, about = "Generate website proposal content with an LLM")]
struct Cli {
    /// Config file (defaults to ~/.pitchcraft/config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate proposal sections from a context file
    Generate {
        /// JSON file describing the client
        #[arg(long)]
        context: PathBuf,

        /// Comma-separated section names (default: all)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        /// Fail instead of returning a partial result
        #[arg(long)]
        strict: bool,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        max_retries: Option<u32>,

        /// Print text chunks as they arrive
        #[arg(long, conflicts_with = "concurrency")]
        stream: bool,

        /// Generate each section in its own request, this many at a time
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Regenerate a single section
    Section {
        #[arg(long)]
        context: PathBuf,

        #[arg(long)]
        section: String,
    },

    /// Validate saved model output offline
    Parse {
        /// File with raw model output (stdin when omitted)
        file: Option<PathBuf>,

        /// Require every listed section
        #[arg(long)]
        strict: bool,

        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,

        /// Never fail; recover what can be recovered
        #[arg(long, conflicts_with = "strict")]
        best_effort: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitchcraft=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            context,
            sections,
            strict,
            model,
            max_retries,
            stream,
            concurrency,
        } => {
            let args = commands::GenerateArgs {
                context,
                sections,
                strict,
                model,
                max_retries,
                stream,
                concurrency,
            };
            commands::run_generate(cli.config.as_deref(), args).await?;
        }
        Commands::Section { context, section } => {
            commands::run_section(cli.config.as_deref(), &context, &section).await?;
        }
        Commands::Parse {
            file,
            strict,
            sections,
            best_effort,
        } => {
            commands::run_parse(file.as_deref(), strict, &sections, best_effort)?;
        }
    }

    Ok(())
}
