use serde::{Serialize, Deserialize};

/// Progress event emitted by `train_loop` on every reported epoch.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the training
/// loop sends one `EpochStats` value each `report_every` epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Running batch-loss total divided by the number of batches.
    pub mean_loss: f64,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Summary returned once training stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    /// Mean loss of every completed epoch, in order.
    pub loss_history: Vec<f64>,
    /// Eval-mode argmax accuracy over the training set, in [0, 1].
    pub train_accuracy: f64,
    /// True when a stop flag or a dropped progress receiver ended the run
    /// before `epochs` were completed.
    pub stopped_early: bool,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}
