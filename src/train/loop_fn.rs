use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::data::dataset::Dataset;
use crate::error::Result;
use crate::network::classifier::Classifier;
use crate::train::epoch_stats::{EpochStats, TrainingReport};
use crate::train::train_config::TrainConfig;
use crate::train::trainer::Trainer;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `model` for `config.epochs` epochs and returns the fitted model
/// together with the per-epoch loss history.
///
/// # Arguments
/// - `model`   — freshly constructed classifier; the loop takes ownership for
///               the duration of training
/// - `dataset` — training samples and labels, shape-checked against `model`
/// - `config`  — hyperparameters, optional progress channel, optional stop flag
///
/// # Progress
/// Every `config.report_every`-th epoch (1-indexed) the epoch's mean loss is
/// logged and, if configured, sent on `progress_tx`.
///
/// # Early termination
/// The loop breaks between epochs if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
///
/// # Errors
/// `Error::Config` for invalid hyperparameters or a dataset that does not fit
/// the model, `Error::TrainingDivergence` on the first non-finite batch loss.
pub fn train_loop(
    model: Classifier,
    dataset: &Dataset,
    config: &TrainConfig,
) -> Result<(Classifier, TrainingReport)> {
    let mut trainer = Trainer::new(model, config)?;
    trainer.check_dataset(dataset)?;

    info!(
        samples = dataset.len(),
        parameters = trainer.model().parameter_count(),
        epochs = config.epochs,
        batch_size = config.batch_size,
        learning_rate = config.learning_rate,
        "starting training"
    );

    let mut loss_history = Vec::with_capacity(config.epochs);
    let mut stopped_early = false;

    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            stopped_early = true;
            break;
        }

        let t_start = Instant::now();
        let mean_loss = trainer.run_epoch(dataset)?;
        let elapsed_ms = t_start.elapsed().as_millis() as u64;
        loss_history.push(mean_loss);
        debug!(epoch, mean_loss, elapsed_ms, "epoch complete");

        if epoch % config.report_every == 0 {
            info!(epoch, mean_loss, "Epoch {}/{}, Loss: {:.4}", epoch, config.epochs, mean_loss);

            if let Some(ref tx) = config.progress_tx {
                let stats = EpochStats {
                    epoch,
                    total_epochs: config.epochs,
                    mean_loss,
                    elapsed_ms,
                };
                // If the receiver has been dropped, stop training.
                if tx.send(stats).is_err() {
                    warn!(epoch, "progress receiver dropped, stopping");
                    stopped_early = epoch < config.epochs;
                    break;
                }
            }
        }
    }

    let train_accuracy = trainer.accuracy(dataset);
    let report = TrainingReport {
        epochs_completed: trainer.epoch(),
        loss_history,
        train_accuracy,
        stopped_early,
    };
    info!(
        epochs = report.epochs_completed,
        final_loss = report.final_loss(),
        train_accuracy,
        "Training complete!"
    );

    Ok((trainer.into_model(), report))
}

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}
