//! franz - command-line client for the 0.7 log broker protocol.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use franz_client::ClientConfig;
use franz_protocol::{Compression, Offset};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "franz")]
#[command(about = "Produce to and consume from a 0.7 log broker")]
#[command(version)]
struct Cli {
    /// Broker address (overrides FRANZ_BROKER and the config file)
    #[arg(short, long)]
    broker: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send payloads to a partition (one per argument, or one per stdin line)
    Produce {
        /// Topic name
        #[arg(short, long)]
        topic: String,

        /// Partition number
        #[arg(short, long, default_value_t = 0)]
        partition: u32,

        /// Compression codec (none, gzip)
        #[arg(short, long)]
        compression: Option<Compression>,

        /// Payloads to send
        payloads: Vec<String>,
    },

    /// Read messages from a partition
    Consume {
        /// Topic name
        #[arg(short, long)]
        topic: String,

        /// Partition number
        #[arg(short, long, default_value_t = 0)]
        partition: u32,

        /// Starting offset, decimal or 0x-prefixed hex
        #[arg(short, long, default_value = "0")]
        offset: Offset,

        /// Maximum bytes per fetch (overrides the config)
        #[arg(long)]
        max_size: Option<u32>,

        /// Stop after this many messages
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Keep polling for new messages until Ctrl+C
        #[arg(short, long)]
        follow: bool,
    },

    /// Look up segment start offsets of a partition
    Offsets {
        /// Topic name
        #[arg(short, long)]
        topic: String,

        /// Partition number
        #[arg(short, long, default_value_t = 0)]
        partition: u32,

        /// "latest", "earliest", or milliseconds since the epoch
        #[arg(long, default_value = "latest")]
        time: String,

        /// Maximum number of offsets to return
        #[arg(short, long, default_value_t = 1)]
        max: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match ClientConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            std::process::exit(2);
        }
    };
    if let Some(broker) = cli.broker {
        config.broker = broker;
    }
    tracing::debug!(broker = %config.broker, "using broker");

    let channel = franz_client::connect(&config.connection_config())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;

    match commands::execute(channel, &config, cli.command).await {
        Ok(output) => {
            if !output.is_empty() {
                eprintln!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
