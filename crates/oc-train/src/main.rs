mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::CliOverrides;
use pipeline::{EvaluateArgs, TrainArgs};

/// oc-train: object-condensation training for point-cloud clustering.
#[derive(Parser)]
#[command(name = "oc-train", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model on a directory of JSON events.
    Train {
        /// Path to training config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory of JSON event files.
        #[arg(long)]
        data: PathBuf,
        /// Checkpoint directory (default: ckpts_<unix-seconds>).
        #[arg(long)]
        ckptdir: Option<PathBuf>,
        /// Train on a small subset and write no checkpoints.
        #[arg(long)]
        dry: bool,
        /// Debug-level logging.
        #[arg(long, short)]
        verbose: bool,
        /// Override the number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override events per batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the base learning rate.
        #[arg(long)]
        lr: Option<f64>,
    },
    /// Report the loss breakdown of a checkpoint on a directory of events.
    Evaluate {
        /// Path to training config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory of JSON event files.
        #[arg(long)]
        data: PathBuf,
        /// Checkpoint weight file (e.g. ckpts_123/ckpt_best.mpk).
        #[arg(long)]
        checkpoint: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            data,
            ckptdir,
            dry,
            verbose,
            epochs,
            batch_size,
            lr,
        } => {
            init_tracing(verbose);
            pipeline::run_train(TrainArgs {
                config,
                data,
                ckptdir,
                dry,
                overrides: CliOverrides {
                    epochs,
                    batch_size,
                    lr,
                },
            })
        }
        Command::Evaluate {
            config,
            data,
            checkpoint,
        } => {
            init_tracing(false);
            pipeline::run_evaluate(EvaluateArgs {
                config,
                data,
                checkpoint,
            })
        }
    }
}
