use std::path::Path;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::layers::{Dense, DenseGradients, Dropout, Layer, Mode};
use crate::math::matrix::Matrix;
use crate::network::spec::ArchitectureSpec;

/// Feed-forward classifier: `[Linear → ReLU → Dropout]* → Linear → Softmax`.
///
/// The layer sequence is built once from an `ArchitectureSpec` and never
/// changes shape; training only rewrites the `Linear` parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    pub spec: ArchitectureSpec,
    pub layers: Vec<Layer>,
}

/// Everything a forward pass recorded for backpropagation.
pub struct ForwardPass {
    /// `inputs[i]` is what layer `i` received.
    inputs: Vec<Matrix>,
    /// Dropout keep-masks, `Some` only for dropout layers in training mode.
    masks: Vec<Option<Matrix>>,
    /// Class probabilities, one row per sample.
    pub output: Matrix,
}

impl ForwardPass {
    /// Pre-softmax scores, i.e. the input of the final layer.
    pub fn logits(&self) -> &Matrix {
        self.inputs.last().unwrap_or(&self.output)
    }
}

impl Classifier {
    /// Builds the layer sequence for `spec` with freshly initialized weights.
    pub fn new<R: Rng + ?Sized>(spec: ArchitectureSpec, rng: &mut R) -> Result<Classifier> {
        spec.validate()?;

        let mut layers = Vec::with_capacity(spec.hidden_sizes.len() * 3 + 2);
        let mut width = spec.input_size;
        for &hidden in &spec.hidden_sizes {
            layers.push(Layer::Linear(Dense::new(hidden, width, rng)));
            layers.push(Layer::relu());
            layers.push(Layer::Dropout(Dropout::new(spec.dropout_rate)));
            width = hidden;
        }
        layers.push(Layer::Linear(Dense::new(spec.output_size, width, rng)));
        layers.push(Layer::softmax());

        Ok(Classifier { spec, layers })
    }

    pub fn architecture(&self) -> &ArchitectureSpec {
        &self.spec
    }

    pub fn input_size(&self) -> usize {
        self.spec.input_size
    }

    pub fn output_size(&self) -> usize {
        self.spec.output_size
    }

    /// Forward pass over a batch (one sample per row); stores what
    /// `backward()` needs.
    pub fn forward(&self, input: &Matrix, mut mode: Mode<'_>) -> ForwardPass {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut masks = Vec::with_capacity(self.layers.len());
        let mut current = input.clone();

        for layer in &self.layers {
            let (next, mask) = match layer {
                Layer::Linear(dense) => (dense.forward(&current), None),
                Layer::Activation { function } => (function.forward(&current), None),
                Layer::Dropout(dropout) => dropout.forward(&current, &mut mode),
            };
            inputs.push(std::mem::replace(&mut current, next));
            masks.push(mask);
        }

        ForwardPass { inputs, masks, output: current }
    }

    /// Inference-mode forward pass: dropout is the identity.
    pub fn predict(&self, input: &Matrix) -> Matrix {
        self.forward(input, Mode::Eval).output
    }

    /// Backpropagates `grad_logits` (∂L/∂logits, one row per sample) and
    /// returns gradients for every `Linear` layer, in layer order.
    pub fn backward(&self, pass: &ForwardPass, grad_logits: &Matrix) -> Vec<DenseGradients> {
        let mut grads = Vec::new();
        let mut delta = grad_logits.clone();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            delta = match layer {
                Layer::Linear(dense) => {
                    let (g, input_delta) = dense.backward(&pass.inputs[i], &delta);
                    grads.push(g);
                    input_delta
                }
                Layer::Activation { function } => function.backward(&pass.inputs[i], &delta),
                Layer::Dropout(dropout) => dropout.backward(&delta, pass.masks[i].as_ref()),
            };
        }

        grads.reverse();
        grads
    }

    pub fn dense_layers(&self) -> impl Iterator<Item = &Dense> {
        self.layers.iter().filter_map(|layer| match layer {
            Layer::Linear(dense) => Some(dense),
            _ => None,
        })
    }

    pub fn dense_layers_mut(&mut self) -> impl Iterator<Item = &mut Dense> {
        self.layers.iter_mut().filter_map(|layer| match layer {
            Layer::Linear(dense) => Some(dense),
            _ => None,
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.dense_layers().map(Dense::parameter_count).sum()
    }

    /// Checks that consecutive layers agree on widths and that the sequence
    /// ends in a softmax over `output_size` classes.
    pub fn check_consistency(&self) -> Result<()> {
        self.spec.validate()?;
        let mut width = self.spec.input_size;
        for (i, layer) in self.layers.iter().enumerate() {
            match layer {
                Layer::Linear(dense) => {
                    if dense.input_size != width {
                        return Err(Error::Config(format!(
                            "layer {i}: expects {} inputs, but receives {width}",
                            dense.input_size
                        )));
                    }
                    if !has_dims(&dense.weights, dense.input_size, dense.size)
                        || !has_dims(&dense.biases, 1, dense.size)
                    {
                        return Err(Error::Config(format!(
                            "layer {i}: parameters do not match {}x{}",
                            dense.input_size, dense.size
                        )));
                    }
                }
                Layer::Dropout(dropout) if !(0.0..1.0).contains(&dropout.rate) => {
                    return Err(Error::Config(format!(
                        "layer {i}: dropout rate must be in [0, 1), got {}",
                        dropout.rate
                    )));
                }
                _ => {}
            }
            width = layer.output_width(width);
        }
        if width != self.spec.output_size {
            return Err(Error::Config(format!(
                "network produces {width} outputs, expected {}",
                self.spec.output_size
            )));
        }
        if self.layers.last() != Some(&Layer::softmax()) {
            return Err(Error::Config("network must end with a softmax layer".into()));
        }
        Ok(())
    }

    /// Serializes the architecture and weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a classifier previously written by `save_json`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Classifier> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let classifier: Classifier = serde_json::from_reader(reader)?;
        classifier.check_consistency()?;
        Ok(classifier)
    }
}

/// Declared shape and actual row storage both equal `rows x cols`.
fn has_dims(m: &Matrix, rows: usize, cols: usize) -> bool {
    m.shape() == (rows, cols) && m.data.len() == rows && m.data.iter().all(|r| r.len() == cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::cross_entropy::CrossEntropyLoss;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn small_classifier(seed: u64) -> Classifier {
        let spec = ArchitectureSpec::with_hidden_size(5, 8, 3);
        Classifier::new(spec, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn builds_default_topology() {
        let model = Classifier::new(ArchitectureSpec::new(12), &mut ChaCha8Rng::seed_from_u64(0)).unwrap();
        let widths: Vec<(usize, usize)> = model.dense_layers().map(|d| (d.input_size, d.size)).collect();
        assert_eq!(widths, vec![(12, 128), (128, 64), (64, 8)]);
        assert_eq!(model.layers.len(), 8);
        assert_eq!(model.parameter_count(), 12 * 128 + 128 + 128 * 64 + 64 + 64 * 8 + 8);
        model.check_consistency().unwrap();
    }

    #[test]
    fn output_rows_are_probability_distributions() {
        let model = small_classifier(1);
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut input = Matrix::random(16, 5, &mut rng);
        input.data[0] = vec![1e6, -1e6, 3e5, 0.0, -7e4];

        for output in [model.predict(&input), model.forward(&input, Mode::Train(&mut rng)).output] {
            assert_eq!(output.shape(), (16, 3));
            for row in &output.data {
                assert!(row.iter().all(|&p| p >= 0.0 && p <= 1.0));
                assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn eval_forward_is_deterministic() {
        let model = small_classifier(2);
        let input = Matrix::random(4, 5, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(model.predict(&input), model.predict(&input));
    }

    #[test]
    fn backward_matches_numerical_gradient() {
        let model = small_classifier(4);
        let input = Matrix::random(3, 5, &mut ChaCha8Rng::seed_from_u64(5));
        let labels = [0usize, 2, 1];

        let pass = model.forward(&input, Mode::Eval);
        let grad_logits = CrossEntropyLoss::gradient(&pass.output, &labels);
        let grads = model.backward(&pass, &grad_logits);

        let loss_of = |m: &Classifier| {
            let p = m.forward(&input, Mode::Eval);
            CrossEntropyLoss::loss(p.logits(), &labels)
        };

        let eps = 1e-6;
        for (layer_idx, (r, c)) in [(0usize, (1usize, 2usize)), (1, (4, 0)), (2, (3, 1))] {
            let mut plus = model.clone();
            plus.dense_layers_mut().nth(layer_idx).unwrap().weights.data[r][c] += eps;
            let mut minus = model.clone();
            minus.dense_layers_mut().nth(layer_idx).unwrap().weights.data[r][c] -= eps;
            let numeric = (loss_of(&plus) - loss_of(&minus)) / (2.0 * eps);
            let analytic = grads[layer_idx].weights.data[r][c];
            assert!(
                (numeric - analytic).abs() < 1e-5,
                "layer {layer_idx} w[{r}][{c}]: numeric {numeric} vs analytic {analytic}"
            );
        }

        let mut plus = model.clone();
        plus.dense_layers_mut().last().unwrap().biases.data[0][1] += eps;
        let mut minus = model.clone();
        minus.dense_layers_mut().last().unwrap().biases.data[0][1] -= eps;
        let numeric = (loss_of(&plus) - loss_of(&minus)) / (2.0 * eps);
        assert!((numeric - grads[2].biases.data[0][1]).abs() < 1e-5);
    }

    #[test]
    fn json_round_trip_preserves_predictions() {
        let model = small_classifier(6);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save_json(&path).unwrap();
        let loaded = Classifier::load_json(&path).unwrap();
        let input = Matrix::random(2, 5, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(model.predict(&input), loaded.predict(&input));
    }

    #[test]
    fn inconsistent_layers_are_rejected() {
        let mut model = small_classifier(8);
        model.spec.input_size = 6;
        assert!(matches!(model.check_consistency(), Err(Error::Config(_))));
    }

    #[test]
    fn ragged_checkpoint_is_rejected_on_load() {
        let mut model = small_classifier(9);
        model.dense_layers_mut().nth(1).unwrap().weights.data[2].pop();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.json");
        model.save_json(&path).unwrap();
        assert!(matches!(Classifier::load_json(&path), Err(Error::Config(_))));

        let mut model = small_classifier(9);
        model.dense_layers_mut().next().unwrap().biases.data.clear();
        model.save_json(&path).unwrap();
        assert!(matches!(Classifier::load_json(&path), Err(Error::Config(_))));
    }

    #[test]
    fn out_of_range_dropout_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropout.json");

        let mut model = small_classifier(10);
        for layer in &mut model.layers {
            if let Layer::Dropout(dropout) = layer {
                dropout.rate = 1.5;
            }
        }
        model.save_json(&path).unwrap();
        assert!(matches!(Classifier::load_json(&path), Err(Error::Config(_))));

        let mut model = small_classifier(10);
        model.spec.dropout_rate = -0.1;
        model.save_json(&path).unwrap();
        assert!(matches!(Classifier::load_json(&path), Err(Error::Config(_))));
    }
}
