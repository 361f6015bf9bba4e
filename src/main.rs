//! Command-line interface for mq-loadgen
//!
//! # Usage Examples
//!
//! ## Produce
//! ```bash
//! # Publish 100 messages in one flat run
//! mq-loadgen produce --total-count 100 \
//!   --brokers localhost:9092 --topic loadgen
//!
//! # Publish 50 messages for each of 10 sessions, creating the topic first
//! mq-loadgen produce --total-count 50 --partition-count 10 \
//!   --create-topic --brokers localhost:9092 --topic loadgen
//! ```
//!
//! ## Consume
//! ```bash
//! # Record latencies with 4 consumers until 500 messages each were seen
//! mq-loadgen consume --num-consumers 4 --max-messages 500 \
//!   --brokers localhost:9092 --topic loadgen
//!
//! # Run for a minute, appending observations to a JSON Lines file
//! mq-loadgen consume --run-for-secs 60 --metrics-jsonl latencies.jsonl \
//!   --brokers localhost:9092 --topic loadgen
//! ```
//!
//! ## Drain and Self-Test
//! ```bash
//! # Sweep loadgen.dead-letter until it has been idle for 5 seconds
//! mq-loadgen drain --brokers localhost:9092 --topic loadgen
//!
//! # Exercise the pipeline over the in-memory queue, no broker needed
//! mq-loadgen selftest --total-count 5 --partition-count 2
//! ```

use clap::{Parser, Subcommand};
use mq_loadgen::commands::consume::{run_consume, ConsumeArgs};
use mq_loadgen::commands::drain::{run_drain, DrainArgs};
use mq_loadgen::commands::produce::{run_produce, ProduceArgs};
use mq_loadgen::commands::selftest::{run_selftest, SelftestArgs};

#[derive(Parser)]
#[command(name = "mq-loadgen")]
#[command(about = "Synthetic load generator and latency harness for message queues")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a run of test messages to the topic
    Produce {
        #[command(flatten)]
        args: ProduceArgs,
    },

    /// Consume the topic and record per-message latencies
    Consume {
        #[command(flatten)]
        args: ConsumeArgs,
    },

    /// Sweep a dead-letter topic clean
    Drain {
        #[command(flatten)]
        args: DrainArgs,
    },

    /// Run the whole pipeline over an in-memory queue
    Selftest {
        #[command(flatten)]
        args: SelftestArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Produce { args } => run_produce(args).await,
        Commands::Consume { args } => run_consume(args).await,
        Commands::Drain { args } => run_drain(args).await,
        Commands::Selftest { args } => run_selftest(args).await,
    }
}
