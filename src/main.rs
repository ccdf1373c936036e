use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paperdoc::cli::commands::{self, Overrides, generate::GenerateOptions};
use paperdoc::pipeline::RunOutcome;

#[derive(Parser)]
#[command(name = "paperdoc")]
#[command(
    version,
    about = "Documentation generator for C++ codebases grounded in academic papers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: paperdoc.toml or config.yaml in the working directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Document every function in the source tree
    Generate {
        #[arg(long, help = "Source tree root")]
        source: Option<PathBuf>,
        #[arg(long, help = "Paper corpus directory")]
        papers: Option<PathBuf>,
        #[arg(long, short, help = "Output directory for artifacts")]
        output: Option<PathBuf>,
        #[arg(long, help = "LLM provider (ollama, openai, gemini)")]
        provider: Option<String>,
        #[arg(long, help = "Model to use")]
        model: Option<String>,
        #[arg(long, help = "Units processed concurrently")]
        concurrency: Option<usize>,
        #[arg(long = "top-k", help = "Paper chunks retrieved per unit")]
        top_k: Option<usize>,
        #[arg(long, help = "Run report path (JSON)")]
        report: Option<PathBuf>,
        #[arg(long = "dry-run", help = "Extract, index and compose only; no provider calls")]
        dry_run: bool,
    },

    /// List extracted units as JSON
    Extract {
        #[arg(long, help = "Source tree root")]
        source: Option<PathBuf>,
    },

    /// Build the paper index and show corpus statistics
    Index {
        #[arg(long, help = "Paper corpus directory")]
        papers: Option<PathBuf>,
        #[arg(long, help = "Rank chunks against this text")]
        query: Option<String>,
        #[arg(long = "top-k", default_value = "5", help = "Chunks shown for --query")]
        top_k: usize,
    },

    /// Check that the LLM provider is reachable
    Health {
        #[arg(long, help = "LLM provider (ollama, openai, gemini)")]
        provider: Option<String>,
        #[arg(long, help = "Model to use")]
        model: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json, yaml"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Write a default paperdoc.toml
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mpaperdoc encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Ok(false) when the command ran but should exit non-zero
fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.config;
    match cli.command {
        Commands::Generate {
            source,
            papers,
            output,
            provider,
            model,
            concurrency,
            top_k,
            report,
            dry_run,
        } => {
            let outcome = commands::generate::run(GenerateOptions {
                config,
                overrides: Overrides {
                    source,
                    papers,
                    output,
                    provider,
                    model,
                    concurrency,
                    top_k,
                },
                report,
                dry_run,
                quiet: cli.quiet,
            })?;
            Ok(outcome != RunOutcome::Failed)
        }
        Commands::Extract { source } => {
            commands::extract::run(config, source)?;
            Ok(true)
        }
        Commands::Index {
            papers,
            query,
            top_k,
        } => {
            commands::index::run(config, papers, query, top_k)?;
            Ok(true)
        }
        Commands::Health { provider, model } => {
            Ok(commands::health::run(config, provider, model)?)
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show { format } => commands::config::show(config.as_deref(), &format)?,
                ConfigAction::Path => commands::config::path()?,
                ConfigAction::Init { force } => commands::config::init(force)?,
            }
            Ok(true)
        }
    }
}
