use crate::layers::{Dense, DenseGradients};
use crate::math::matrix::Matrix;
use crate::network::classifier::Classifier;

pub const DEFAULT_BETA1: f64 = 0.9;
pub const DEFAULT_BETA2: f64 = 0.999;
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
struct Moments {
    m: Matrix,
    v: Matrix,
}

impl Moments {
    fn zeros_like(param: &Matrix) -> Moments {
        Moments {
            m: Matrix::zeros(param.rows, param.cols),
            v: Matrix::zeros(param.rows, param.cols),
        }
    }
}

/// Adam optimizer with bias-corrected moment estimates.
///
/// Holds one pair of moment buffers per weight and bias tensor, created
/// lazily on the first `step()` from the shapes of the model it updates.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    /// Number of updates applied so far.
    t: u64,
    state: Vec<(Moments, Moments)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            epsilon: DEFAULT_EPSILON,
            t: 0,
            state: Vec::new(),
        }
    }

    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Applies one update to every `Linear` layer of `model`.
    /// `grads` must be in layer order, as returned by `Classifier::backward()`.
    pub fn step(&mut self, model: &mut Classifier, grads: &[DenseGradients]) {
        if self.state.is_empty() {
            self.state = model.dense_layers()
                .map(|d| (Moments::zeros_like(&d.weights), Moments::zeros_like(&d.biases)))
                .collect();
        }
        assert_eq!(self.state.len(), grads.len(), "one gradient per linear layer");

        self.t += 1;
        let t = self.t as i32;
        let coeffs = StepCoefficients {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            correction1: 1.0 - self.beta1.powi(t),
            correction2: 1.0 - self.beta2.powi(t),
        };

        let layers = model.dense_layers_mut();
        for ((layer, g), (mw, mb)) in layers.zip(grads).zip(self.state.iter_mut()) {
            let Dense { weights, biases, .. } = layer;
            coeffs.apply(weights, &g.weights, mw);
            coeffs.apply(biases, &g.biases, mb);
        }
    }
}

/// Hyperparameters and bias corrections for the current step.
#[derive(Clone, Copy)]
struct StepCoefficients {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    correction1: f64,
    correction2: f64,
}

impl StepCoefficients {
    fn apply(&self, param: &mut Matrix, grad: &Matrix, moments: &mut Moments) {
        for i in 0..param.rows {
            for j in 0..param.cols {
                let g = grad.data[i][j];
                let m = &mut moments.m.data[i][j];
                let v = &mut moments.v.data[i][j];
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / self.correction1;
                let v_hat = *v / self.correction2;
                param.data[i][j] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::ArchitectureSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model() -> Classifier {
        let spec = ArchitectureSpec::with_hidden_size(3, 4, 2);
        Classifier::new(spec, &mut ChaCha8Rng::seed_from_u64(0)).unwrap()
    }

    fn constant_grads(model: &Classifier, value: f64) -> Vec<DenseGradients> {
        model.dense_layers()
            .map(|d| DenseGradients {
                weights: d.weights.map(|_| value),
                biases: d.biases.map(|_| value),
            })
            .collect()
    }

    #[test]
    fn first_step_moves_each_parameter_by_learning_rate() {
        let mut model = model();
        let before = model.clone();
        let grads = constant_grads(&model, 0.3);
        let mut adam = Adam::new(0.01);
        adam.step(&mut model, &grads);

        assert_eq!(adam.steps(), 1);
        for (old, new) in before.dense_layers().zip(model.dense_layers()) {
            for (a, b) in old.weights.data.iter().flatten().zip(new.weights.data.iter().flatten()) {
                // Bias-corrected first step is lr * g / (|g| + eps).
                assert!((a - b - 0.01).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn zero_gradient_leaves_parameters_unchanged() {
        let mut model = model();
        let before = model.clone();
        let grads = constant_grads(&model, 0.0);
        Adam::new(0.01).step(&mut model, &grads);
        assert_eq!(before, model);
    }

    #[test]
    fn update_direction_opposes_gradient() {
        let mut model = model();
        let before = model.clone();
        let grads = constant_grads(&model, -2.0);
        let mut adam = Adam::new(0.001);
        for _ in 0..3 {
            adam.step(&mut model, &grads);
        }
        let old = before.dense_layers().next().unwrap().biases.data[0][0];
        let new = model.dense_layers().next().unwrap().biases.data[0][0];
        assert!(new > old);
    }
}
