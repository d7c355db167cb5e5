use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    /// Softmax is vector-valued: it normalizes each row of the batch, so it is
    /// applied through `forward()` rather than element-wise.
    Softmax,
}

impl ActivationFunction {
    /// Applies the activation to a whole batch (one sample per row).
    pub fn forward(&self, z: &Matrix) -> Matrix {
        match self {
            ActivationFunction::ReLU => z.map(relu),
            ActivationFunction::Softmax => softmax_rows(z),
        }
    }

    /// Maps ∂L/∂a back to ∂L/∂z given the pre-activation `z`.
    ///
    /// For `Softmax`, the layer is always paired with cross-entropy and the
    /// combined gradient `predicted - expected` is already expressed w.r.t.
    /// the logits (see `CrossEntropyLoss::gradient()`), so the delta passes
    /// through unchanged.
    pub fn backward(&self, z: &Matrix, delta: &Matrix) -> Matrix {
        match self {
            ActivationFunction::ReLU => delta.hadamard(&z.map(relu_derivative)),
            ActivationFunction::Softmax => delta.clone(),
        }
    }

    /// ONNX operator implementing this activation.
    pub fn op_type(&self) -> &'static str {
        match self {
            ActivationFunction::ReLU => "Relu",
            ActivationFunction::Softmax => "Softmax",
        }
    }
}

/// NaN-preserving ReLU: a NaN input stays NaN so divergence is still visible
/// downstream.
pub fn relu(x: f64) -> f64 {
    if x < 0.0 { 0.0 } else { x }
}

pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

/// Numerically stable softmax of a single row (max-subtraction).
pub fn softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = row.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Numerically stable log-softmax of a single row (log-sum-exp).
pub fn log_softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f64>().ln() + max;
    row.iter().map(|&x| x - log_sum).collect()
}

pub fn softmax_rows(z: &Matrix) -> Matrix {
    Matrix {
        rows: z.rows,
        cols: z.cols,
        data: z.data.iter().map(|row| softmax(row)).collect(),
    }
}
