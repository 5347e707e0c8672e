//! vksnoop: decode, inspect, and validate capture streams.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmds;

#[derive(Parser)]
#[command(name = "vksnoop")]
#[command(about = "Decode and inspect captured API call traces")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every decodable call record as text
    Dump {
        /// Path to the registry description JSON
        #[arg(short, long)]
        catalog: PathBuf,

        /// Only dump commands whose name matches this regex
        #[arg(short, long)]
        filter: Option<String>,

        /// Write the dump here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Prefix every line with thread id and timestamp
        #[arg(long)]
        thread_info: bool,

        /// Path to the capture stream
        trace: PathBuf,
    },
    /// Per-command record counts and byte totals
    Stats {
        /// Path to the registry description JSON
        #[arg(short, long)]
        catalog: PathBuf,

        /// Path to the capture stream
        trace: PathBuf,
    },
    /// Decode an entire capture stream and report every problem
    Validate {
        /// Path to the registry description JSON
        #[arg(short, long)]
        catalog: PathBuf,

        /// Path to the capture stream
        trace: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Dump {
            catalog,
            filter,
            output,
            thread_info,
            trace,
        } => cmds::dump::run(
            &catalog,
            &trace,
            filter.as_deref(),
            output.as_deref(),
            thread_info,
        ),
        Commands::Stats { catalog, trace } => cmds::stats::run(&catalog, &trace),
        Commands::Validate { catalog, trace } => cmds::validate::run(&catalog, &trace),
    }
}
