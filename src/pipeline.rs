use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::provider::{CsvDataProvider, DataProvider};
use crate::error::Result;
use crate::export::{ExportedArtifact, Exporter};
use crate::network::classifier::Classifier;
use crate::train::epoch_stats::TrainingReport;
use crate::train::loop_fn::train_loop;
use crate::train::train_config::TrainConfig;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub model: Classifier,
    pub report: TrainingReport,
    pub artifact: ExportedArtifact,
}

/// Load → train → export, reading both CSV files named in `config.data`.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutcome> {
    let provider = CsvDataProvider::new(
        &config.data.features,
        &config.data.labels,
        config.model.num_classes,
    );
    run_with_provider(&provider, config, config.train_config())
}

/// Same as `run`, but with a caller-supplied data source and training
/// settings (e.g. a `TrainConfig` carrying a progress channel or stop flag).
///
/// Stages run strictly in sequence and the first error aborts the run;
/// nothing is written unless training finished.
pub fn run_with_provider(
    provider: &dyn DataProvider,
    config: &PipelineConfig,
    train_config: TrainConfig,
) -> Result<PipelineOutcome> {
    config.validate()?;
    train_config.validate()?;

    let dataset = provider.load()?;
    let input_size = dataset.input_size();

    let mut rng = ChaCha8Rng::seed_from_u64(train_config.seed);
    let model = Classifier::new(config.architecture(input_size), &mut rng)?;
    info!(
        input_size,
        hidden = ?model.architecture().hidden_sizes,
        classes = model.output_size(),
        parameters = model.parameter_count(),
        "model constructed"
    );

    let (model, report) = train_loop(model, &dataset, &train_config)?;

    if let Some(checkpoint) = &config.export.checkpoint {
        model.save_json(checkpoint)?;
        info!(path = %checkpoint.display(), "checkpoint saved");
    }

    let artifact = Exporter::new(config.export_options()).export(&model, input_size, &config.export.output)?;
    info!(path = %artifact.path.display(), "Model exported to {}", artifact.path.display());

    Ok(PipelineOutcome { model, report, artifact })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Dataset;
    use crate::error::{DataFormatError, Error};

    struct InMemory(Vec<Vec<f64>>, Vec<usize>, usize);

    impl DataProvider for InMemory {
        fn load(&self) -> std::result::Result<Dataset, DataFormatError> {
            Dataset::from_rows(self.0.clone(), self.1.clone(), self.2)
        }
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.model.hidden_size = 16;
        config.model.num_classes = 3;
        config.training.epochs = 5;
        config.training.batch_size = 4;
        config.export.output = dir.join("out.onnx");
        config.export.checkpoint = Some(dir.join("model.json"));
        config
    }

    #[test]
    fn trains_and_exports_from_provider() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 / 30.0, (i % 3) as f64]).collect();
        let labels = (0..30).map(|i| i % 3).collect();
        let provider = InMemory(rows, labels, 3);

        let outcome = run_with_provider(&provider, &config, config.train_config()).unwrap();
        assert_eq!(outcome.report.epochs_completed, 5);
        assert!(outcome.artifact.path.exists());
        let restored = Classifier::load_json(dir.path().join("model.json")).unwrap();
        assert_eq!(restored, outcome.model);
    }

    #[test]
    fn data_errors_abort_before_export() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let provider = InMemory(vec![vec![0.0, 1.0]; 4], vec![0, 1, 2, 3], 3);

        let err = run_with_provider(&provider, &config, config.train_config()).unwrap_err();
        assert!(matches!(err, Error::DataFormat(DataFormatError::LabelOutOfRange { label: 3, .. })));
        assert!(!config.export.output.exists());
    }
}
