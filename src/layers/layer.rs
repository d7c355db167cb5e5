use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::layers::dense::Dense;
use crate::layers::dropout::Dropout;

/// One step of the classifier's layer sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Linear(Dense),
    Activation { function: ActivationFunction },
    Dropout(Dropout),
}

impl Layer {
    pub fn relu() -> Layer {
        Layer::Activation { function: ActivationFunction::ReLU }
    }

    pub fn softmax() -> Layer {
        Layer::Activation { function: ActivationFunction::Softmax }
    }

    /// Number of units this layer produces, given the width of its input.
    pub fn output_width(&self, input_width: usize) -> usize {
        match self {
            Layer::Linear(dense) => dense.size,
            Layer::Activation { .. } | Layer::Dropout(_) => input_width,
        }
    }
}
