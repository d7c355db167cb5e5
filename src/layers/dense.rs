use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// Fully connected layer: `z = x·W + b`.
///
/// `weights` has shape (input_size, size) and `biases` shape (1, size), so a
/// batch of row vectors multiplies on the left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub size: usize,
    pub input_size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
}

/// Gradients of the batch loss w.r.t. one `Dense` layer's parameters.
#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub weights: Matrix,
    pub biases: Matrix,
}

impl Dense {
    /// He-initialized weights, zero biases.
    pub fn new<R: Rng + ?Sized>(size: usize, input_size: usize, rng: &mut R) -> Dense {
        Dense {
            size,
            input_size,
            weights: Matrix::he(input_size, size, rng),
            biases: Matrix::zeros(1, size),
        }
    }

    pub fn forward(&self, input: &Matrix) -> Matrix {
        (input * &self.weights).add_row(&self.biases)
    }

    /// Computes parameter gradients and ∂L/∂input.
    /// `delta` is ∂L/∂z for this layer, one row per sample.
    pub fn backward(&self, input: &Matrix, delta: &Matrix) -> (DenseGradients, Matrix) {
        let grads = DenseGradients {
            weights: &input.transpose() * delta,
            biases: delta.sum_rows(),
        };
        let input_delta = delta * &self.weights.transpose();
        (grads, input_delta)
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.rows * self.weights.cols + self.biases.cols
    }
}
