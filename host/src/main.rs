//! Witness-EVM Host CLI
//!
//! Command-line interface for validating provable inputs against the
//! stateless execution validator.

mod io;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use witness_evm_core::prelude::*;

#[derive(Parser)]
#[command(name = "witness-evm")]
#[command(about = "Stateless execution validator for witness-backed block inputs")]
#[command(version)]
struct Cli {
    /// Verbose output (debug logs)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one or more provable inputs
    Execute {
        /// Paths to provable input JSON files
        #[arg(short, long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,
    },

    /// Generate a sample input file
    Sample {
        /// Path to save the sample input
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Initializes the global tracing subscriber.
///
/// The default level is `info`, or `debug` with `--verbose`. `RUST_LOG` overrides both.
fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Commands::Execute { input } => {
            cmd_execute(input).await?;
        }
        Commands::Sample { output } => {
            cmd_sample(output)?;
        }
    }

    Ok(())
}

async fn cmd_execute(input_paths: Vec<PathBuf>) -> Result<()> {
    println!("Witness-EVM Execute");
    println!("===================");

    let executor = Arc::new(ProvableExecutor::new());
    let mut tasks = Vec::with_capacity(input_paths.len());
    for path in input_paths {
        let executor = executor.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            let input = io::load_input_json(&path)?;
            debug!(path = %path.display(), blocks = input.blocks.len(), "loaded input");
            let result = executor.execute(&input);
            Ok::<_, anyhow::Error>((path, result))
        }));
    }

    let mut failures = 0;
    for task in tasks {
        let (path, result) = task.await.context("Validation task panicked")??;
        match result {
            Ok(result) => {
                println!("\n✓ {} is VALID", path.display());
                println!("{}", io::format_result(&result));
            }
            Err(err) => {
                failures += 1;
                println!("\n✗ {} is INVALID ({:?})", path.display(), err.kind());
                println!("  {err}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} input(s) failed validation");
    }
    Ok(())
}

fn cmd_sample(output_path: PathBuf) -> Result<()> {
    println!("Generating sample input...");

    let signer = DevSigner::from_seed(1).context("Failed to derive sample key")?;
    let sender = signer.address();
    let receiver = Address::repeat_byte(0x02);
    let value = U256::from(1_000_000_000_000_000u64);
    let tx = signer
        .transfer(DEV_CHAIN_ID, 0, receiver, value)
        .context("Failed to sign sample transaction")?;

    let input = ProverInputBuilder::new()
        .with_account(
            sender,
            AccountState::new_with_balance(U256::from(10u128.pow(18))),
        )
        .with_transaction(tx)
        .build()
        .context("Failed to build sample input")?;

    io::save_input_json(&input, &output_path)?;
    info!(path = %output_path.display(), "sample input written");

    println!("Sample input saved to {:?}", output_path);
    println!("  Sender: {:?}", sender);
    println!("  Receiver: {:?}", receiver);
    println!("  Value: 0.001 ETH");
    println!("  State root: {}", io::format_hash(&input.blocks[0].header.state_root));

    Ok(())
}
