use crate::activation::activation::log_softmax;
use crate::math::matrix::Matrix;

/// Sparse categorical cross-entropy for use with a Softmax output layer.
///
/// Targets are class indices, not one-hot rows.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Mean over the batch of `-ln p[label]`, where `p = softmax(logits)`.
    ///
    /// Evaluated as `-log_softmax(logits)[label]` so that a confident wrong
    /// prediction yields a large finite loss instead of `ln(0) = -inf`.
    /// Non-finite logits produce a non-finite loss.
    pub fn loss(logits: &Matrix, labels: &[usize]) -> f64 {
        assert_eq!(logits.rows, labels.len(), "one label per row");
        let total: f64 = logits.data.iter().zip(labels)
            .map(|(row, &label)| -log_softmax(row)[label])
            .sum();
        total / labels.len() as f64
    }

    /// Gradient of the batch-mean loss w.r.t. the pre-softmax logits.
    ///
    /// When Softmax and cross-entropy are composed the gradient simplifies to
    ///   ∂L/∂z_i = (predicted[i] - onehot(label)[i]) / batch_len
    ///
    /// This is the initial delta passed into the backward pass. The Softmax
    /// layer's own backward step is the identity so the Jacobian is not
    /// applied twice.
    pub fn gradient(probabilities: &Matrix, labels: &[usize]) -> Matrix {
        assert_eq!(probabilities.rows, labels.len(), "one label per row");
        let inv_batch = 1.0 / labels.len() as f64;
        let mut grad = probabilities.map(|p| p * inv_batch);
        for (row, &label) in grad.data.iter_mut().zip(labels) {
            row[label] -= inv_batch;
        }
        grad
    }
}
