use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::export::builder::{INPUT_NAME, OUTPUT_NAME};
use crate::export::checker::{check_model, CheckedModel};
use crate::export::proto::{self, ModelProto, NodeProto, ATTRIBUTE_FLOAT, ATTRIBUTE_INT};
use crate::math::matrix::Matrix;

/// Dense row-major float32 tensor of rank 1 or 2.
#[derive(Debug, Clone)]
struct Tensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Tensor {
    fn at(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }
}

/// Minimal ONNX interpreter for the graphs this crate exports.
///
/// Loading runs the structural checker first, so `run` only has to deal with
/// run-time shape problems (a batch of the wrong width).
#[derive(Debug, Clone)]
pub struct OnnxRuntime {
    model: ModelProto,
    checked: CheckedModel,
    initializers: HashMap<String, Tensor>,
}

fn failure(msg: impl Into<String>) -> Error {
    Error::InferenceVerification(msg.into())
}

impl OnnxRuntime {
    pub fn load(path: impl AsRef<Path>) -> Result<OnnxRuntime> {
        let bytes = std::fs::read(path)?;
        OnnxRuntime::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<OnnxRuntime> {
        let model = proto::decode(bytes)?;
        let checked = check_model(&model)?;
        Ok(OnnxRuntime::from_checked(model, checked))
    }

    /// Wraps a model that already passed `check_model`.
    pub fn from_checked(model: ModelProto, checked: CheckedModel) -> OnnxRuntime {
        let initializers = model
            .graph
            .iter()
            .flat_map(|g| g.initializer.iter())
            .map(|t| {
                let (rows, cols) = match t.dims.as_slice() {
                    [r, c] => (*r as usize, *c as usize),
                    [n] => (1, *n as usize),
                    _ => (1, 1),
                };
                (t.name.clone(), Tensor { rows, cols, data: t.to_f32() })
            })
            .collect();
        OnnxRuntime { model, checked, initializers }
    }

    /// Feeds `input` (one sample per row) through the graph and returns the
    /// `output` tensor. Any batch size is accepted.
    pub fn run(&self, input: &Matrix) -> Result<Matrix> {
        let (rows, cols) = input.shape();
        let width = self.checked.input_width().unwrap_or(cols);
        if cols != width {
            return Err(failure(format!("input has {cols} features, graph expects {width}")));
        }

        let mut values: HashMap<&str, Tensor> = HashMap::new();
        values.insert(INPUT_NAME, Tensor {
            rows,
            cols,
            data: input.data.iter().flatten().map(|&x| x as f32).collect(),
        });

        let nodes = self.model.graph.iter().flat_map(|g| g.node.iter());
        for node in nodes {
            let args: Vec<&Tensor> = node
                .input
                .iter()
                .map(|name| {
                    values
                        .get(name.as_str())
                        .or_else(|| self.initializers.get(name))
                        .ok_or_else(|| failure(format!("value '{name}' is not available")))
                })
                .collect::<Result<_>>()?;

            let out = match node.op_type.as_str() {
                "Gemm" => gemm(node, &args)?,
                "Relu" => map(args[0], |x| x.max(0.0)),
                "Softmax" => softmax_rows(args[0]),
                other => return Err(failure(format!("cannot evaluate operator '{other}'"))),
            };
            debug!(node = %node.name, rows = out.rows, cols = out.cols, "evaluated");
            values.insert(node.output[0].as_str(), out);
        }

        let out = values
            .remove(OUTPUT_NAME)
            .ok_or_else(|| failure(format!("graph did not produce '{OUTPUT_NAME}'")))?;
        let data = out
            .data
            .chunks(out.cols.max(1))
            .map(|row| row.iter().map(|&x| x as f64).collect())
            .collect();
        Ok(Matrix::from_data(data))
    }
}

fn gemm(node: &NodeProto, args: &[&Tensor]) -> Result<Tensor> {
    let (a, b) = match args {
        [a, b] | [a, b, _] => (*a, *b),
        _ => return Err(failure("Gemm needs 2 or 3 inputs")),
    };
    let int = |name: &str| node.attr(name).filter(|x| x.r#type == ATTRIBUTE_INT).map_or(0, |x| x.i);
    let float = |name: &str| node.attr(name).filter(|x| x.r#type == ATTRIBUTE_FLOAT).map_or(1.0, |x| x.f);
    let (trans_a, trans_b) = (int("transA") != 0, int("transB") != 0);
    let (alpha, beta) = (float("alpha"), float("beta"));

    let (m, k) = if trans_a { (a.cols, a.rows) } else { (a.rows, a.cols) };
    let (k_b, n) = if trans_b { (b.cols, b.rows) } else { (b.rows, b.cols) };
    if k != k_b {
        return Err(failure(format!("Gemm inner dimensions differ: {k} vs {k_b}")));
    }

    let mut data = vec![0.0f32; m * n];
    for i in 0..m {
        for p in 0..k {
            let a_ip = if trans_a { a.at(p, i) } else { a.at(i, p) };
            for j in 0..n {
                let b_pj = if trans_b { b.at(j, p) } else { b.at(p, j) };
                data[i * n + j] += a_ip * b_pj;
            }
        }
    }
    for x in &mut data {
        *x *= alpha;
    }

    if let Some(c) = args.get(2) {
        for i in 0..m {
            for j in 0..n {
                let ci = if c.rows == 1 { 0 } else { i };
                let cj = if c.cols == 1 { 0 } else { j };
                data[i * n + j] += beta * c.at(ci, cj);
            }
        }
    }
    Ok(Tensor { rows: m, cols: n, data })
}

fn map(t: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    Tensor { rows: t.rows, cols: t.cols, data: t.data.iter().map(|&x| f(x)).collect() }
}

fn softmax_rows(t: &Tensor) -> Tensor {
    let mut data = Vec::with_capacity(t.data.len());
    for row in t.data.chunks(t.cols.max(1)) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = row.iter().map(|&x| (x - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        data.extend(exps.iter().map(|e| e / sum));
    }
    Tensor { rows: t.rows, cols: t.cols, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::builder::build_model;
    use crate::export::exporter::ExportOptions;
    use crate::network::{ArchitectureSpec, Classifier};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model() -> Classifier {
        let spec = ArchitectureSpec::with_hidden_size(5, 16, 4);
        Classifier::new(spec, &mut ChaCha8Rng::seed_from_u64(21)).unwrap()
    }

    fn runtime(model: &Classifier) -> OnnxRuntime {
        let bytes = proto::encode(&build_model(model, &ExportOptions::default()));
        OnnxRuntime::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn matches_eval_forward_pass() {
        let model = model();
        let input = Matrix::random(7, 5, &mut ChaCha8Rng::seed_from_u64(1));
        let expected = model.predict(&input);
        let actual = runtime(&model).run(&input).unwrap();
        assert_eq!(actual.shape(), (7, 4));
        for (a, e) in actual.data.iter().flatten().zip(expected.data.iter().flatten()) {
            assert!((a - e).abs() < 1e-4, "{a} vs {e}");
        }
    }

    #[test]
    fn accepts_any_batch_size() {
        let model = model();
        let rt = runtime(&model);
        for batch in [1, 3, 64] {
            let input = Matrix::random(batch, 5, &mut ChaCha8Rng::seed_from_u64(batch as u64));
            let out = rt.run(&input).unwrap();
            assert_eq!(out.shape(), (batch, 4));
            for row in &out.data {
                assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn rejects_wrong_feature_width() {
        let rt = runtime(&model());
        let input = Matrix::zeros(2, 6);
        assert!(matches!(rt.run(&input), Err(Error::InferenceVerification(_))));
    }

    #[test]
    fn garbage_bytes_do_not_load() {
        assert!(matches!(OnnxRuntime::from_bytes(&[0xff, 0xff, 0xff]), Err(Error::Decode(_))));
    }

    #[test]
    fn transposed_gemm_operands() {
        let a = Tensor { rows: 3, cols: 2, data: vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0] };
        let b = Tensor { rows: 2, cols: 3, data: vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0] };
        let node = NodeProto {
            op_type: "Gemm".into(),
            attribute: vec![
                proto::AttributeProto::int("transA", 1),
                proto::AttributeProto::int("transB", 1),
            ],
            ..Default::default()
        };
        // A^T = [[1,2,3],[4,5,6]], B^T = [[1,0],[0,1],[1,1]]
        let out = gemm(&node, &[&a, &b]).unwrap();
        assert_eq!((out.rows, out.cols), (2, 2));
        assert_eq!(out.data, vec![4.0, 5.0, 10.0, 11.0]);
    }
}
