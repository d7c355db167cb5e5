//! Pipeline configuration loaded from TOML.
//!
//! Every table and field is optional; anything left out falls back to the
//! defaults of the reference training run (50 epochs, batch 32, Adam at
//! 0.001, hidden width 128, dropout 0.2, 8 classes).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::ExportOptions;
use crate::network::metadata::ModelMetadata;
use crate::network::spec::{self, ArchitectureSpec};
use crate::train::train_config::{self, TrainConfig};

pub const DEFAULT_FEATURES_PATH: &str = "features.csv";
pub const DEFAULT_LABELS_PATH: &str = "labels.csv";
pub const DEFAULT_OUTPUT_PATH: &str = "emotion_classifier_model.onnx";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub features: PathBuf,
    pub labels: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            features: PathBuf::from(DEFAULT_FEATURES_PATH),
            labels: PathBuf::from(DEFAULT_LABELS_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Width of the first hidden layer; the second gets half of it.
    pub hidden_size: usize,
    pub num_classes: usize,
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            hidden_size: spec::DEFAULT_HIDDEN_SIZE,
            num_classes: spec::DEFAULT_OUTPUT_SIZE,
            dropout: spec::DEFAULT_DROPOUT_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub report_every: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: train_config::DEFAULT_EPOCHS,
            batch_size: train_config::DEFAULT_BATCH_SIZE,
            learning_rate: train_config::DEFAULT_LEARNING_RATE,
            report_every: train_config::DEFAULT_REPORT_EVERY,
            seed: train_config::DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub output: PathBuf,
    /// Where to also write the trained model as JSON, if anywhere.
    pub checkpoint: Option<PathBuf>,
    pub metadata: ModelMetadata,
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            output: PathBuf::from(DEFAULT_OUTPUT_PATH),
            checkpoint: None,
            metadata: ModelMetadata::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<PipelineConfig> {
        let text = std::fs::read_to_string(path)?;
        PipelineConfig::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = toml::from_str(text)?;
        Ok(config)
    }

    /// Range checks that can be done before any data is read.
    pub fn validate(&self) -> Result<()> {
        self.train_config().validate()?;
        // The input width is only known after loading; any positive value
        // exercises the remaining architecture checks.
        self.architecture(1).validate()?;
        if let Some(labels) = &self.export.metadata.output_labels {
            if labels.len() != self.model.num_classes {
                return Err(Error::Config(format!(
                    "{} output labels given for {} classes",
                    labels.len(),
                    self.model.num_classes
                )));
            }
        }
        if self.export.output.as_os_str().is_empty() {
            return Err(Error::Config("export output path is empty".into()));
        }
        Ok(())
    }

    pub fn train_config(&self) -> TrainConfig {
        let t = &self.training;
        let mut config = TrainConfig::new(t.epochs, t.batch_size, t.learning_rate).with_seed(t.seed);
        config.report_every = t.report_every;
        config
    }

    pub fn architecture(&self, input_size: usize) -> ArchitectureSpec {
        ArchitectureSpec::with_hidden_size(input_size, self.model.hidden_size, self.model.num_classes)
            .dropout(self.model.dropout)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            seed: self.training.seed,
            metadata: self.export.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.model.hidden_size, 128);
        assert_eq!(config.export.output, PathBuf::from("emotion_classifier_model.onnx"));
        config.validate().unwrap();
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [data]
            features = "data/x.csv"

            [training]
            epochs = 5
            learning_rate = 0.01

            [export.metadata]
            description = "mood"
            "#,
        )
        .unwrap();
        assert_eq!(config.data.features, PathBuf::from("data/x.csv"));
        assert_eq!(config.data.labels, PathBuf::from(DEFAULT_LABELS_PATH));
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.export.metadata.description.as_deref(), Some("mood"));

        let train = config.train_config();
        assert_eq!((train.epochs, train.batch_size, train.seed), (5, 32, 42));
        let arch = config.architecture(12);
        assert_eq!(arch.hidden_sizes, vec![128, 64]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PipelineConfig::from_toml_str("[training]\nepoch = 3\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = PipelineConfig::default();
        config.training.learning_rate = -1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.model.dropout = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.export.metadata.output_labels = Some(vec!["HAPPY".into(), "SAD".into()]);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[model]\nhidden_size = 32\nnum_classes = 4\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.model.hidden_size, 32);
        assert_eq!(config.architecture(3).output_size, 4);
    }
}
