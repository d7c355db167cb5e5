use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};

/// Shape and regularization of the feed-forward classifier.
///
/// Fields:
/// - `input_size`   — number of features per sample (D, inferred from data)
/// - `hidden_sizes` — widths of the hidden ReLU layers, input → output order
/// - `output_size`  — number of classes (C)
/// - `dropout_rate` — dropout applied after every hidden activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureSpec {
    pub input_size: usize,
    pub hidden_sizes: Vec<usize>,
    pub output_size: usize,
    pub dropout_rate: f64,
}

pub const DEFAULT_HIDDEN_SIZE: usize = 128;
pub const DEFAULT_OUTPUT_SIZE: usize = 8;
pub const DEFAULT_DROPOUT_RATE: f64 = 0.2;

impl ArchitectureSpec {
    /// Default topology: D → 128 → 64 → 8 with dropout 0.2.
    pub fn new(input_size: usize) -> ArchitectureSpec {
        ArchitectureSpec::with_hidden_size(input_size, DEFAULT_HIDDEN_SIZE, DEFAULT_OUTPUT_SIZE)
    }

    /// Two hidden layers of `hidden_size` and `hidden_size / 2` units.
    pub fn with_hidden_size(input_size: usize, hidden_size: usize, output_size: usize) -> ArchitectureSpec {
        ArchitectureSpec {
            input_size,
            hidden_sizes: vec![hidden_size, hidden_size / 2],
            output_size,
            dropout_rate: DEFAULT_DROPOUT_RATE,
        }
    }

    pub fn dropout(mut self, rate: f64) -> ArchitectureSpec {
        self.dropout_rate = rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(Error::Config("input size must be positive".into()));
        }
        if self.output_size == 0 {
            return Err(Error::Config("output class count must be positive".into()));
        }
        if let Some(pos) = self.hidden_sizes.iter().position(|&w| w == 0) {
            return Err(Error::Config(format!("hidden layer {} has zero width", pos + 1)));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(Error::Config(format!(
                "dropout rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }
}
