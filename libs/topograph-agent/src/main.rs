// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Topograph binaries.
//!
//! `agent` maintains the local host graph and forwards it to an analyzer.
//! `analyzer` accepts forwarder connections and merges every host into
//! one replica graph.

mod agent;
mod analyzer;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use topograph::TopographConfig;

#[derive(Parser)]
#[command(name = "topograph-agent")]
#[command(about = "Topology graph agent and analyzer", version = topograph::VERSION)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, env = "TOPOGRAPH_CONFIG", default_value = TopographConfig::FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the host agent
    Agent {
        /// Override the host identifier
        #[arg(long)]
        host_id: Option<String>,

        /// Analyzer address (host:port)
        #[arg(long)]
        analyzer: Option<String>,
    },
    /// Run the analyzer
    Analyzer {
        /// Listen address (host:port)
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TopographConfig::load_or_default(&cli.config);
    topograph::core::logging::init(&config.logging.filter)
        .context("Failed to initialize logging")?;

    tracing::info!(
        "Topograph v{} (PID: {}), config {}",
        topograph::VERSION,
        std::process::id(),
        cli.config.display()
    );

    match cli.command {
        Command::Agent { host_id, analyzer } => {
            if host_id.is_some() {
                config.host.id = host_id;
            }
            if let Some(address) = analyzer {
                config.agent.analyzers = vec![address];
            }
            agent::run(config).await
        }
        Command::Analyzer { listen } => {
            if let Some(address) = listen {
                config.analyzer.listen = address;
            }
            analyzer::run(config).await
        }
    }
}
