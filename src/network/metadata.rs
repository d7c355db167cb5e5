use serde::{Deserialize, Serialize};

/// Optional annotations carried into the exported artifact.
/// All fields are Option<> so configs without a `[export.metadata]` table
/// deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelMetadata {
    pub description: Option<String>,
    /// Human-readable class labels for the output layer, in class-index order
    /// (e.g. ["happy", "sad", ...]).
    pub output_labels: Option<Vec<String>>,
}

impl ModelMetadata {
    /// Flattens the metadata into ONNX `metadata_props` key/value pairs.
    pub fn to_props(&self) -> Vec<(String, String)> {
        let mut props = Vec::new();
        if let Some(description) = &self.description {
            props.push(("description".to_string(), description.clone()));
        }
        if let Some(labels) = &self.output_labels {
            props.push(("output_labels".to_string(), labels.join(",")));
        }
        props
    }
}
