//! `tabular-nn` command line: train a classifier from CSV files and export
//! it to ONNX, or inspect an exported artifact.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tabular_nn::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "tabular-nn", author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a features/labels CSV pair and export the model to ONNX
    ///
    /// Settings come from the optional TOML file; flags override single fields.
    Train {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Features CSV (N rows x D floats, no header)
        #[arg(long)]
        features: Option<PathBuf>,

        /// Labels CSV (N rows x 1 class index, no header)
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Destination of the .onnx artifact
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        learning_rate: Option<f64>,

        /// Width of the first hidden layer (the second is half as wide)
        #[arg(long)]
        hidden_size: Option<usize>,

        #[arg(long)]
        num_classes: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        /// Also save the trained model as JSON
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Print the signature of an exported .onnx file as JSON
    Inspect {
        artifact: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match Args::parse().command {
        Command::Train {
            config,
            features,
            labels,
            output,
            epochs,
            batch_size,
            learning_rate,
            hidden_size,
            num_classes,
            seed,
            checkpoint,
        } => {
            let mut cfg = match &config {
                Some(path) => PipelineConfig::load(path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PipelineConfig::default(),
            };

            if let Some(v) = features { cfg.data.features = v; }
            if let Some(v) = labels { cfg.data.labels = v; }
            if let Some(v) = output { cfg.export.output = v; }
            if let Some(v) = epochs { cfg.training.epochs = v; }
            if let Some(v) = batch_size { cfg.training.batch_size = v; }
            if let Some(v) = learning_rate { cfg.training.learning_rate = v; }
            if let Some(v) = hidden_size { cfg.model.hidden_size = v; }
            if let Some(v) = num_classes { cfg.model.num_classes = v; }
            if let Some(v) = seed { cfg.training.seed = v; }
            if checkpoint.is_some() { cfg.export.checkpoint = checkpoint; }

            let outcome = tabular_nn::run(&cfg).context("training pipeline failed")?;
            println!(
                "exported {} ({} bytes), final loss {:.4}, train accuracy {:.1}%",
                outcome.artifact.path.display(),
                outcome.artifact.size_bytes,
                outcome.report.final_loss().unwrap_or(f64::NAN),
                outcome.report.train_accuracy * 100.0
            );
        }
        Command::Inspect { artifact } => {
            let summary = tabular_nn::inspect(&artifact)
                .with_context(|| format!("inspecting {}", artifact.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
