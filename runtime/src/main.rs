//! Cloakscope CLI entry point.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloakscope::cli::{scan_cmd, score_cmd};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cloakscope",
    version,
    about = "Detect sites that serve performance auditors a different page"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress and summary output.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable ANSI colors.
    #[arg(long, global = true)]
    no_color: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture every URL as a regular visitor and as the auditor, and score the difference.
    Scan(scan_cmd::ScanOptions),

    /// Score two saved capture profiles.
    Score {
        /// Profile captured with the standard identity.
        standard: PathBuf,
        /// Profile captured with the auditor identity.
        auditor: PathBuf,
        /// JSON config with threshold overrides.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "cloakscope=debug"
    } else if cli.quiet || cli.json {
        "cloakscope=warn"
    } else {
        "cloakscope=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Global flags are read by cli::output through the environment.
    if cli.json {
        std::env::set_var("CLOAKSCOPE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("CLOAKSCOPE_QUIET", "1");
    }
    if cli.no_color {
        std::env::set_var("CLOAKSCOPE_NO_COLOR", "1");
    }

    init_tracing(&cli);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;

    match cli.command {
        Commands::Scan(opts) => runtime.block_on(scan_cmd::run(opts)),
        Commands::Score {
            standard,
            auditor,
            config,
        } => score_cmd::run(&standard, &auditor, config.as_deref()),
    }
}
