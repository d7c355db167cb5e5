pub mod builder;
pub mod checker;
pub mod exporter;
pub mod proto;
pub mod runtime;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

pub use builder::build_model;
pub use checker::{check_model, CheckedModel, Dim};
pub use exporter::{ExportOptions, ExportedArtifact, Exporter};
pub use runtime::OnnxRuntime;

/// Human-readable digest of an exported `.onnx` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSummary {
    pub ir_version: i64,
    pub opset_version: i64,
    pub producer: String,
    pub input_name: String,
    /// `None` marks a dynamic dimension.
    pub input_shape: Vec<Option<usize>>,
    pub output_name: String,
    pub output_shape: Vec<Option<usize>>,
    /// Operator types in execution order.
    pub operators: Vec<String>,
    pub parameter_count: usize,
    pub metadata: BTreeMap<String, String>,
}

/// Reads, decodes and checks an artifact, then summarizes its signature.
pub fn inspect(path: impl AsRef<Path>) -> Result<ArtifactSummary> {
    let bytes = std::fs::read(path)?;
    let model = proto::decode(&bytes)?;
    let checked = check_model(&model)?;
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| Error::ExportValidation("model has no graph".into()))?;

    let dims = |shape: &[Dim]| shape.iter().map(Dim::fixed).collect::<Vec<_>>();
    Ok(ArtifactSummary {
        ir_version: model.ir_version,
        opset_version: checked.opset_version,
        producer: format!("{} {}", model.producer_name, model.producer_version),
        input_name: builder::INPUT_NAME.to_string(),
        input_shape: dims(&checked.input_shape),
        output_name: builder::OUTPUT_NAME.to_string(),
        output_shape: dims(&checked.output_shape),
        operators: graph.node.iter().map(|n| n.op_type.clone()).collect(),
        parameter_count: graph.initializer.iter().map(|t| t.to_f32().len()).sum(),
        metadata: model
            .metadata_props
            .iter()
            .map(|p| (p.key.clone(), p.value.clone()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ArchitectureSpec, Classifier};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn summarizes_exported_file() {
        let model = Classifier::new(ArchitectureSpec::new(12), &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        let mut options = ExportOptions::default();
        options.metadata.description = Some("emotion classifier".into());
        Exporter::new(options).export(&model, 12, &path).unwrap();

        let summary = inspect(&path).unwrap();
        assert_eq!(summary.input_shape, vec![None, Some(12)]);
        assert_eq!(summary.output_shape, vec![None, Some(8)]);
        assert_eq!(summary.operators, vec!["Gemm", "Relu", "Gemm", "Relu", "Gemm", "Softmax"]);
        assert_eq!(summary.parameter_count, model.parameter_count());
        assert_eq!(summary.metadata["description"], "emotion classifier");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(inspect(dir.path().join("absent.onnx")), Err(Error::Io(_))));
    }
}
