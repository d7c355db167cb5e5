use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::builder::{INPUT_NAME, OUTPUT_NAME};
use crate::export::proto::{
    tensor_shape_proto::dimension, ModelProto, NodeProto, ValueInfoProto, ATTRIBUTE_INT,
    DATA_TYPE_FLOAT,
};

/// Opset range whose `Gemm`, `Relu` and `Softmax` semantics the checker and
/// the interpreter agree on.
pub const MIN_OPSET: i64 = 7;
pub const MAX_OPSET: i64 = 21;

/// Lowest IR version that may carry a default-domain import of `opset`,
/// per the ONNX release table (opset 7 shipped with IR 3, opset 21 with IR 10).
pub fn min_ir_version(opset: i64) -> i64 {
    match opset {
        ..=8 => 3,
        9 => 4,
        10 => 5,
        11 => 6,
        12..=14 => 7,
        15..=18 => 8,
        19..=20 => 9,
        _ => 10,
    }
}

/// One dimension of a tensor shape as seen by shape inference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    Fixed(usize),
    /// Symbolic dimension, resolved at run time (e.g. `batch_size`).
    Dynamic(String),
}

impl Dim {
    pub fn fixed(&self) -> Option<usize> {
        match self {
            Dim::Fixed(n) => Some(*n),
            Dim::Dynamic(_) => None,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{n}"),
            Dim::Dynamic(name) => f.write_str(name),
        }
    }
}

pub type Shape = Vec<Dim>;

/// What a successful check established about the graph boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedModel {
    pub opset_version: i64,
    pub input_shape: Shape,
    pub output_shape: Shape,
}

impl CheckedModel {
    /// Width of the feature dimension the graph accepts.
    pub fn input_width(&self) -> Option<usize> {
        self.input_shape.last().and_then(Dim::fixed)
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::ExportValidation(msg.into())
}

/// Structural validation of a decoded model: opset, graph signature, value
/// references, initializer payloads and shape inference end to end.
///
/// Only graphs built from `Gemm`, `Relu` and `Softmax` are accepted, since
/// those are the operators the interpreter can evaluate.
pub fn check_model(model: &ModelProto) -> Result<CheckedModel> {
    if model.ir_version < 3 {
        return Err(invalid(format!("unsupported IR version {}", model.ir_version)));
    }

    let opset_version = model
        .opset_import
        .iter()
        .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
        .map(|o| o.version)
        .ok_or_else(|| invalid("model does not import the default operator set"))?;
    if !(MIN_OPSET..=MAX_OPSET).contains(&opset_version) {
        return Err(invalid(format!(
            "opset {opset_version} outside supported range {MIN_OPSET}..={MAX_OPSET}"
        )));
    }
    let required_ir = min_ir_version(opset_version);
    if model.ir_version < required_ir {
        return Err(invalid(format!(
            "IR version {} cannot carry opset {opset_version}, which needs IR {required_ir} or later",
            model.ir_version
        )));
    }

    let graph = model.graph.as_ref().ok_or_else(|| invalid("model has no graph"))?;
    let mut shapes: HashMap<&str, Shape> = HashMap::new();

    for init in &graph.initializer {
        if init.name.is_empty() {
            return Err(invalid("initializer without a name"));
        }
        if init.data_type != DATA_TYPE_FLOAT {
            return Err(invalid(format!(
                "initializer '{}' has data type {}, expected FLOAT",
                init.name, init.data_type
            )));
        }
        let mut shape = Vec::with_capacity(init.dims.len());
        for &d in &init.dims {
            let d = usize::try_from(d)
                .map_err(|_| invalid(format!("initializer '{}' has negative dim {d}", init.name)))?;
            shape.push(Dim::Fixed(d));
        }
        let expected: usize = shape.iter().filter_map(Dim::fixed).product();
        let found = init.to_f32().len();
        if found != expected || init.raw_data.len() % 4 != 0 {
            return Err(invalid(format!(
                "initializer '{}' holds {found} values, dims {:?} need {expected}",
                init.name, init.dims
            )));
        }
        if shapes.insert(&init.name, shape).is_some() {
            return Err(invalid(format!("initializer '{}' defined twice", init.name)));
        }
    }

    // Graph inputs may legally list initializers too; only the rest are fed.
    let fed: Vec<&ValueInfoProto> = graph
        .input
        .iter()
        .filter(|v| !shapes.contains_key(v.name.as_str()))
        .collect();
    let input = match fed.as_slice() {
        [only] if only.name == INPUT_NAME => *only,
        _ => {
            let names: Vec<&str> = fed.iter().map(|v| v.name.as_str()).collect();
            return Err(invalid(format!(
                "graph must take a single input named '{INPUT_NAME}', found {names:?}"
            )));
        }
    };
    let output = match graph.output.as_slice() {
        [only] if only.name == OUTPUT_NAME => only,
        _ => {
            let names: Vec<&str> = graph.output.iter().map(|v| v.name.as_str()).collect();
            return Err(invalid(format!(
                "graph must produce a single output named '{OUTPUT_NAME}', found {names:?}"
            )));
        }
    };

    let input_shape = declared_shape(input)?;
    let output_shape = declared_shape(output)?;
    shapes.insert(INPUT_NAME, input_shape.clone());

    for (idx, node) in graph.node.iter().enumerate() {
        let label = if node.name.is_empty() { format!("#{idx}") } else { node.name.clone() };
        if !(node.domain.is_empty() || node.domain == "ai.onnx") {
            return Err(invalid(format!("node {label}: unsupported domain '{}'", node.domain)));
        }

        let mut in_shapes = Vec::with_capacity(node.input.len());
        for name in &node.input {
            let shape = shapes.get(name.as_str()).ok_or_else(|| {
                invalid(format!("node {label}: input '{name}' is not produced by any earlier node"))
            })?;
            in_shapes.push(shape.clone());
        }

        let inferred = infer_node(node, &in_shapes, opset_version)
            .map_err(|msg| invalid(format!("node {label} ({}): {msg}", node.op_type)))?;

        let [out] = node.output.as_slice() else {
            return Err(invalid(format!("node {label}: expected exactly one output")));
        };
        if out.is_empty() || shapes.insert(out, inferred).is_some() {
            return Err(invalid(format!("node {label}: output name '{out}' is empty or reused")));
        }
    }

    let inferred = shapes
        .get(OUTPUT_NAME)
        .ok_or_else(|| invalid(format!("no node produces '{OUTPUT_NAME}'")))?;
    if *inferred != output_shape {
        return Err(invalid(format!(
            "declared output shape {} does not match inferred {}",
            render(&output_shape),
            render(inferred)
        )));
    }

    // Every initializer must feed some node.
    let used: HashSet<&str> = graph.node.iter().flat_map(|n| n.input.iter().map(String::as_str)).collect();
    if let Some(unused) = graph.initializer.iter().find(|i| !used.contains(i.name.as_str())) {
        return Err(invalid(format!("initializer '{}' is never used", unused.name)));
    }

    Ok(CheckedModel { opset_version, input_shape, output_shape })
}

/// Rank-2 float shape with a symbolic batch dimension and a fixed width.
fn declared_shape(value: &ValueInfoProto) -> Result<Shape> {
    let tensor = value
        .tensor_type()
        .ok_or_else(|| invalid(format!("'{}' is not a tensor", value.name)))?;
    if tensor.elem_type != DATA_TYPE_FLOAT {
        return Err(invalid(format!("'{}' must be float32", value.name)));
    }
    let dims = tensor
        .shape
        .as_ref()
        .map(|s| s.dim.as_slice())
        .ok_or_else(|| invalid(format!("'{}' has no shape", value.name)))?;

    let shape: Shape = dims
        .iter()
        .map(|d| match &d.value {
            Some(dimension::Value::DimValue(v)) if *v > 0 => Ok(Dim::Fixed(*v as usize)),
            Some(dimension::Value::DimParam(p)) if !p.is_empty() => Ok(Dim::Dynamic(p.clone())),
            _ => Err(invalid(format!("'{}' has an unset or non-positive dimension", value.name))),
        })
        .collect::<Result<_>>()?;

    match shape.as_slice() {
        [Dim::Dynamic(_), Dim::Fixed(_)] => Ok(shape),
        _ => Err(invalid(format!(
            "'{}' must have shape [batch, width] with a dynamic batch, found {}",
            value.name,
            render(&shape)
        ))),
    }
}

fn infer_node(node: &NodeProto, inputs: &[Shape], opset: i64) -> std::result::Result<Shape, String> {
    match node.op_type.as_str() {
        "Gemm" => infer_gemm(node, inputs),
        "Relu" => match inputs {
            [x] => Ok(x.clone()),
            _ => Err(format!("expected 1 input, got {}", inputs.len())),
        },
        "Softmax" => {
            let [x] = inputs else {
                return Err(format!("expected 1 input, got {}", inputs.len()));
            };
            let rank = x.len() as i64;
            let default_axis = if opset < 13 { 1 } else { -1 };
            let axis = int_attr(node, "axis", default_axis)?;
            let resolved = if axis < 0 { axis + rank } else { axis };
            if resolved != rank - 1 {
                return Err(format!("axis {axis} must select the last of {rank} dimensions"));
            }
            Ok(x.clone())
        }
        other => Err(format!("unsupported operator '{other}'")),
    }
}

fn infer_gemm(node: &NodeProto, inputs: &[Shape]) -> std::result::Result<Shape, String> {
    let (a, b, c) = match inputs {
        [a, b] => (a, b, None),
        [a, b, c] => (a, b, Some(c)),
        _ => return Err(format!("expected 2 or 3 inputs, got {}", inputs.len())),
    };
    let ([a0, a1], [b0, b1]) = (a.as_slice(), b.as_slice()) else {
        return Err("A and B must be rank 2".into());
    };
    let (m, k_a) = if int_attr(node, "transA", 0)? != 0 { (a1, a0) } else { (a0, a1) };
    let (k_b, n) = if int_attr(node, "transB", 0)? != 0 { (b1, b0) } else { (b0, b1) };
    if let (Dim::Fixed(x), Dim::Fixed(y)) = (k_a, k_b) {
        if x != y {
            return Err(format!("inner dimensions differ: {x} vs {y}"));
        }
    }

    if let Some(c) = c {
        let broadcasts = |dim: &Dim, target: &Dim| dim == target || *dim == Dim::Fixed(1);
        let ok = match c.as_slice() {
            [] => true,
            [cn] => broadcasts(cn, n),
            [cm, cn] => broadcasts(cm, m) && broadcasts(cn, n),
            _ => false,
        };
        if !ok {
            return Err(format!("bias {} does not broadcast to [{m}, {n}]", render(c)));
        }
    }
    Ok(vec![m.clone(), n.clone()])
}

fn int_attr(node: &NodeProto, name: &str, default: i64) -> std::result::Result<i64, String> {
    match node.attr(name) {
        None => Ok(default),
        Some(a) if a.r#type == ATTRIBUTE_INT => Ok(a.i),
        Some(_) => Err(format!("attribute '{name}' must be an int")),
    }
}

pub fn render(shape: &[Dim]) -> String {
    let parts: Vec<String> = shape.iter().map(Dim::to_string).collect();
    format!("[{}]", parts.join(", "))
}
