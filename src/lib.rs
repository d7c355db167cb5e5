pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod data;
pub mod export;
pub mod config;
pub mod pipeline;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::{Dense, Dropout, Layer, Mode};
pub use network::{ArchitectureSpec, Classifier, ModelMetadata};
pub use loss::cross_entropy::CrossEntropyLoss;
pub use optim::adam::Adam;
pub use train::{train_loop, EpochStats, TrainConfig, Trainer, TrainingReport};
pub use data::{CsvDataProvider, DataProvider, Dataset};
pub use export::{inspect, ArtifactSummary, ExportOptions, ExportedArtifact, Exporter, OnnxRuntime};
pub use config::PipelineConfig;
pub use pipeline::{run, run_with_provider, PipelineOutcome};
pub use error::{DataFormatError, Error, Result};
