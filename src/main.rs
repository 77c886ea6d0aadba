mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use product_match::{DataPaths, MatcherConfig};

#[derive(Parser)]
#[command(name = "match")]
#[command(about = "Find catalog products that look like an image", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Data directory (default: ./data)")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "JSON output")]
    json: bool,
    #[arg(long, global = true, help = "Log level when RUST_LOG is unset")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the products most similar to an image
    Search {
        #[arg(long, help = "Image path or http(s) URL")]
        image: String,
        #[arg(long, help = "Maximum number of results")]
        top_k: Option<usize>,
        #[arg(long, help = "Minimum similarity score", allow_negative_numbers = true)]
        min_score: Option<f32>,
        #[arg(long, help = "Force rebuild index before searching")]
        rebuild: bool,
    },
    /// Build the embeddings index
    Index {
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Force rebuild index")]
        rebuild: bool,
    },
    /// Guess the product category of an image
    Classify {
        #[arg(long, help = "Image path or http(s) URL")]
        image: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli) {
        Ok(()) => Ok(()),
        Err(e) if json => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = match cli.data_dir {
        Some(dir) => DataPaths::from_root(dir),
        None => DataPaths::new(),
    };

    let mut config = MatcherConfig::load(&paths.config).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level)?;

    match cli.command {
        Commands::Search {
            image,
            top_k,
            min_score,
            rebuild,
        } => {
            if let Some(k) = top_k {
                config.top_k = k;
            }
            if let Some(score) = min_score {
                config.min_score = score;
            }
            config.validate()?;
            commands::search::run(paths, &config, &image, rebuild, cli.json)
        }
        Commands::Index { status, rebuild } => {
            commands::index::run(paths, &config, status, rebuild, cli.json)
        }
        Commands::Classify { image } => commands::classify::run(paths, &config, &image, cli.json),
    }
}

/// Log to stderr so stdout carries only results
fn init_logging(level: &str) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}
