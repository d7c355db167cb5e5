use rand::{Rng, RngCore};
use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// Whether a forward pass is part of training or inference.
///
/// Training carries the random source that draws dropout masks; inference
/// needs none, so dropout cannot fire by accident at prediction or export time.
pub enum Mode<'r> {
    Train(&'r mut dyn RngCore),
    Eval,
}

/// Inverted dropout: during training each unit is zeroed with probability
/// `rate` and survivors are scaled by `1 / (1 - rate)`, so no rescaling is
/// needed at inference time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    pub rate: f64,
}

impl Dropout {
    pub fn new(rate: f64) -> Dropout {
        assert!((0.0..1.0).contains(&rate), "dropout rate must be in [0, 1), got {rate}");
        Dropout { rate }
    }

    /// Returns the output and, in training mode, the scaled keep-mask needed
    /// by `backward()`.
    pub fn forward(&self, input: &Matrix, mode: &mut Mode<'_>) -> (Matrix, Option<Matrix>) {
        let rng: &mut dyn RngCore = match mode {
            Mode::Train(rng) if self.rate > 0.0 => &mut **rng,
            _ => return (input.clone(), None),
        };
        let scale = 1.0 / (1.0 - self.rate);
        let mut mask = Matrix::zeros(input.rows, input.cols);
        for row in &mut mask.data {
            for m in row.iter_mut() {
                if rng.gen::<f64>() >= self.rate {
                    *m = scale;
                }
            }
        }
        (input.hadamard(&mask), Some(mask))
    }

    pub fn backward(&self, delta: &Matrix, mask: Option<&Matrix>) -> Matrix {
        match mask {
            Some(mask) => delta.hadamard(mask),
            None => delta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn eval_mode_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let x = Matrix::random(4, 16, &mut rng);
        let (y, mask) = Dropout::new(0.5).forward(&x, &mut Mode::Eval);
        assert_eq!(y, x);
        assert!(mask.is_none());
    }

    #[test]
    fn train_mode_zeroes_or_scales() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let x = Matrix::from_data(vec![vec![1.0; 1000]]);
        let (y, mask) = Dropout::new(0.2).forward(&x, &mut Mode::Train(&mut rng));
        assert!(mask.is_some());
        let dropped = y.data[0].iter().filter(|&&v| v == 0.0).count();
        assert!(y.data[0].iter().all(|&v| v == 0.0 || (v - 1.25).abs() < 1e-12));
        // ~200 expected; wide bounds keep this stable across seeds.
        assert!((100..300).contains(&dropped), "dropped {dropped}");
    }

    #[test]
    fn backward_reuses_mask() {
        let mask = Matrix::from_data(vec![vec![0.0, 2.0]]);
        let delta = Matrix::from_data(vec![vec![3.0, 3.0]]);
        let out = Dropout::new(0.5).backward(&delta, Some(&mask));
        assert_eq!(out.data, vec![vec![0.0, 6.0]]);
    }
}
