use std::io::Write;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::export::builder::{build_model, INPUT_NAME, OUTPUT_NAME};
use crate::export::checker::{check_model, Shape};
use crate::export::proto::{self, ModelProto};
use crate::export::runtime::OnnxRuntime;
use crate::math::matrix::Matrix;
use crate::network::classifier::Classifier;
use crate::network::metadata::ModelMetadata;

/// Knobs for `Exporter::export`. The graph format itself is fixed
/// (IR 7, opset 12).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Seed for the dummy input used by the smoke inference.
    pub seed: u64,
    pub metadata: ModelMetadata,
}

/// Description of an artifact that was written, re-read, validated and
/// executed once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedArtifact {
    pub path: PathBuf,
    pub opset_version: i64,
    pub input_name: String,
    pub output_name: String,
    pub input_shape: Shape,
    pub output_shape: Shape,
    /// Probabilities the smoke inference produced for the dummy sample.
    pub smoke_output: Vec<f64>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Exporter {
    options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Exporter {
        Exporter { options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Serializes the eval-mode graph of `model` to `path` and verifies the
    /// bytes on disk: they must decode, pass `check_model`, and run one
    /// `(1, input_size)` dummy sample to a `(1, C)` output.
    ///
    /// The file is staged next to `path` and only renamed onto it once every
    /// check has passed; on error `path` is left untouched.
    ///
    /// The smoke run is a liveness check only; its values are not compared
    /// to the in-memory model.
    pub fn export(&self, model: &Classifier, input_size: usize, path: impl AsRef<Path>) -> Result<ExportedArtifact> {
        if input_size != model.input_size() {
            return Err(Error::ExportValidation(format!(
                "export requested for {input_size} features, but the model takes {}",
                model.input_size()
            )));
        }
        model
            .check_consistency()
            .map_err(|e| Error::ExportValidation(format!("model is not exportable: {e}")))?;

        let graph = build_model(model, &self.options);
        self.publish(&graph, model.output_size(), path.as_ref())
    }

    /// Stages, verifies and atomically publishes an encoded graph that must
    /// produce `num_classes` probabilities per row.
    fn publish(&self, graph: &ModelProto, num_classes: usize, path: &Path) -> Result<ExportedArtifact> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let bytes = proto::encode(graph);
        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;
        debug!(staged = %staged.path().display(), bytes = bytes.len(), "artifact staged");

        // Verify what actually landed on disk, not the in-memory proto.
        let on_disk = std::fs::read(staged.path())?;
        let decoded = proto::decode(&on_disk)
            .map_err(|e| Error::ExportValidation(format!("artifact does not decode: {e}")))?;
        let checked = check_model(&decoded)?;
        info!("ONNX model verified successfully");

        let width = checked
            .input_width()
            .ok_or_else(|| Error::ExportValidation("graph input has no fixed width".into()))?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.options.seed);
        let dummy = Matrix::random(1, width, &mut rng);

        let runtime = OnnxRuntime::from_checked(decoded, checked.clone());
        let output = runtime.run(&dummy)?;
        let expected = (1, num_classes);
        if output.shape() != expected {
            return Err(Error::InferenceVerification(format!(
                "smoke inference returned shape {:?}, expected {:?}",
                output.shape(),
                expected
            )));
        }
        let smoke_output = output.data.into_iter().next().unwrap_or_default();
        info!(
            output_sum = smoke_output.iter().sum::<f64>(),
            "ONNX Runtime inference successful"
        );

        staged.persist(path).map_err(|e| e.error)?;
        debug!(path = %path.display(), "artifact published");

        Ok(ExportedArtifact {
            path: path.to_path_buf(),
            opset_version: checked.opset_version,
            input_name: INPUT_NAME.to_string(),
            output_name: OUTPUT_NAME.to_string(),
            input_shape: checked.input_shape,
            output_shape: checked.output_shape,
            smoke_output,
            size_bytes: on_disk.len() as u64,
        })
    }
}
