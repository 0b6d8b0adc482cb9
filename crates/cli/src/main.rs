//! FlowCheck CLI - Main Entry Point
//!
//! Runs declarative UI verification scenarios against a web application
//! and keeps the project's feature list in step with the results.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{features, run, scenarios};
use flowcheck_driver::DriverConfig;

/// FlowCheck - end-to-end UI verification
#[derive(Parser)]
#[command(name = "flowcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "flowcheck.toml", global = true, env = "FLOWCHECK_CONFIG")]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios and write a results file
    Run(run::RunArgs),

    /// List scenarios
    List(scenarios::ListArgs),

    /// Check scenarios without running them
    Validate(scenarios::ValidateArgs),

    /// Inspect or update feature_list.json
    Features(features::FeaturesArgs),

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run(args) => {
            let passed = run::execute(args, &cli.config, cli.format).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::List(args) => scenarios::execute_list(args, cli.format)?,
        Commands::Validate(args) => {
            if !scenarios::execute_validate(args)? {
                std::process::exit(1);
            }
        }
        Commands::Features(args) => {
            if !features::execute(args, cli.format)? {
                std::process::exit(1);
            }
        }
        Commands::Init { force } => {
            if cli.config.exists() && !force {
                output::print_error(&format!(
                    "{} already exists (use --force to overwrite)",
                    cli.config.display()
                ));
                std::process::exit(1);
            }
            DriverConfig::default().save(&cli.config)?;
            output::print_success(&format!("Wrote {}", cli.config.display()));
        }
        Commands::Version => {
            println!("FlowCheck CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("End-to-end UI verification driver");
        }
    }

    Ok(())
}
