use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::data::dataset::Dataset;
use crate::error::{Error, Result};
use crate::layers::Mode;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::network::classifier::Classifier;
use crate::optim::adam::Adam;
use crate::train::train_config::TrainConfig;

/// Mutable training state: the model being fitted, Adam's moment buffers,
/// the random source for shuffling and dropout, and the epoch counter.
///
/// The trainer owns the model for the whole run; `into_model()` hands the
/// fitted parameters back once training is over.
pub struct Trainer {
    model: Classifier,
    optimizer: Adam,
    rng: ChaCha8Rng,
    batch_size: usize,
    epoch: usize,
}

impl Trainer {
    pub fn new(model: Classifier, config: &TrainConfig) -> Result<Trainer> {
        config.validate()?;
        Ok(Trainer {
            model,
            optimizer: Adam::new(config.learning_rate),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            batch_size: config.batch_size,
            epoch: 0,
        })
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn model(&self) -> &Classifier {
        &self.model
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    pub fn into_model(self) -> Classifier {
        self.model
    }

    /// Errors unless `dataset` has the model's input width and class count.
    pub fn check_dataset(&self, dataset: &Dataset) -> Result<()> {
        if dataset.input_size() != self.model.input_size() {
            return Err(Error::Config(format!(
                "dataset has {} features but the model expects {}",
                dataset.input_size(),
                self.model.input_size()
            )));
        }
        if dataset.num_classes() != self.model.output_size() {
            return Err(Error::Config(format!(
                "dataset has {} classes but the model outputs {}",
                dataset.num_classes(),
                self.model.output_size()
            )));
        }
        Ok(())
    }

    /// Runs one full epoch of mini-batch Adam over `dataset` and returns the
    /// mean batch loss.
    ///
    /// A non-finite batch loss aborts with `Error::TrainingDivergence`; the
    /// parameters are left as they were after the last successful batch.
    pub fn run_epoch(&mut self, dataset: &Dataset) -> Result<f64> {
        self.check_dataset(dataset)?;
        let epoch = self.epoch + 1;

        // Fresh permutation every epoch.
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(&mut self.rng);

        let mut running_loss = 0.0;
        let mut batches = 0usize;

        for chunk in indices.chunks(self.batch_size) {
            batches += 1;
            let (inputs, labels) = dataset.batch(chunk);

            let pass = self.model.forward(&inputs, Mode::Train(&mut self.rng));
            let loss = CrossEntropyLoss::loss(pass.logits(), &labels);
            if !loss.is_finite() {
                return Err(Error::TrainingDivergence { epoch, batch: batches, loss });
            }

            let grad_logits = CrossEntropyLoss::gradient(&pass.output, &labels);
            let grads = self.model.backward(&pass, &grad_logits);
            self.optimizer.step(&mut self.model, &grads);

            trace!(epoch, batch = batches, loss, "batch done");
            running_loss += loss;
        }

        self.epoch = epoch;
        Ok(running_loss / batches as f64)
    }

    /// Fraction of rows whose eval-mode argmax matches the label.
    pub fn accuracy(&self, dataset: &Dataset) -> f64 {
        if dataset.is_empty() {
            return 0.0;
        }
        let output = self.model.predict(dataset.features());
        let correct = output.data.iter().zip(dataset.labels())
            .filter(|(row, label)| argmax(row) == **label)
            .count();
        correct as f64 / dataset.len() as f64
    }
}

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::ArchitectureSpec;

    fn separable_dataset() -> Dataset {
        // Class = which of the two features is larger.
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..64 {
            let a = (i % 8) as f64 / 8.0;
            let b = (i / 8) as f64 / 8.0;
            features.push(vec![a, b]);
            labels.push(usize::from(b > a));
        }
        Dataset::from_rows(features, labels, 2).unwrap()
    }

    fn trainer(seed: u64, lr: f64) -> Trainer {
        let spec = ArchitectureSpec::with_hidden_size(2, 16, 2).dropout(0.0);
        let model = Classifier::new(spec, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap();
        Trainer::new(model, &TrainConfig::new(1, 8, lr).with_seed(seed)).unwrap()
    }

    #[test]
    fn loss_decreases_on_separable_data() {
        let ds = separable_dataset();
        let mut t = trainer(3, 0.01);
        let first = t.run_epoch(&ds).unwrap();
        let mut last = first;
        for _ in 0..60 {
            last = t.run_epoch(&ds).unwrap();
        }
        assert_eq!(t.epoch(), 61);
        assert!(last < first, "first {first}, last {last}");
        assert!(t.accuracy(&ds) > 0.8);
    }

    #[test]
    fn one_adam_step_per_batch() {
        let ds = separable_dataset();
        let mut t = trainer(1, 0.001);
        t.run_epoch(&ds).unwrap();
        // 64 rows in batches of 8.
        assert_eq!(t.optimizer().steps(), 8);
    }

    #[test]
    fn nan_features_diverge_on_first_batch() {
        let ds = Dataset::from_rows(vec![vec![f64::NAN, 0.0]; 10], vec![0; 10], 2).unwrap();
        let mut t = trainer(0, 0.001);
        match t.run_epoch(&ds) {
            Err(Error::TrainingDivergence { epoch, batch, loss }) => {
                assert_eq!((epoch, batch), (1, 1));
                assert!(loss.is_nan());
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_dataset_is_rejected() {
        let ds = Dataset::from_rows(vec![vec![0.0; 3]; 4], vec![0; 4], 2).unwrap();
        assert!(matches!(trainer(0, 0.001).run_epoch(&ds), Err(Error::Config(_))));
    }

    #[test]
    fn argmax_picks_largest_entry() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
