use crate::export::exporter::ExportOptions;
use crate::export::proto::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto, TensorProto, ValueInfoProto,
};
use crate::layers::Layer;
use crate::activation::ActivationFunction;
use crate::network::classifier::Classifier;

pub const INPUT_NAME: &str = "input";
pub const OUTPUT_NAME: &str = "output";
/// Symbolic name of the dynamic leading dimension on both graph tensors.
pub const BATCH_DIM: &str = "batch_size";
/// IR version paired with opset 12.
pub const IR_VERSION: i64 = 7;
pub const OPSET_VERSION: i64 = 12;
pub const PRODUCER_NAME: &str = env!("CARGO_PKG_NAME");

/// Translates the eval-mode forward pass of `model` into an ONNX graph.
///
/// Each `Linear` becomes a `Gemm` whose weight (`[in, out]`) and bias (`[out]`)
/// are embedded as float32 initializers. Activations map onto `Relu` and
/// `Softmax(axis = 1)`. Dropout is the identity at inference time and emits
/// no node.
pub fn build_model(model: &Classifier, options: &ExportOptions) -> ModelProto {
    let mut nodes: Vec<NodeProto> = Vec::new();
    let mut initializers: Vec<TensorProto> = Vec::new();
    let mut current = INPUT_NAME.to_string();
    let mut linear_idx = 0;

    for layer in &model.layers {
        let node = match layer {
            Layer::Linear(dense) => {
                linear_idx += 1;
                let weight = format!("fc{linear_idx}.weight");
                let bias = format!("fc{linear_idx}.bias");
                initializers.push(TensorProto::from_f32(
                    &weight,
                    &[dense.input_size, dense.size],
                    dense.weights.data.iter().flatten().map(|&w| w as f32),
                ));
                initializers.push(TensorProto::from_f32(
                    &bias,
                    &[dense.size],
                    dense.biases.data[0].iter().map(|&b| b as f32),
                ));
                NodeProto {
                    input: vec![current.clone(), weight, bias],
                    name: format!("fc{linear_idx}/Gemm"),
                    op_type: "Gemm".into(),
                    attribute: vec![
                        AttributeProto::float("alpha", 1.0),
                        AttributeProto::float("beta", 1.0),
                    ],
                    ..Default::default()
                }
            }
            Layer::Activation { function } => {
                let attribute = match function {
                    ActivationFunction::Softmax => vec![AttributeProto::int("axis", 1)],
                    ActivationFunction::ReLU => Vec::new(),
                };
                NodeProto {
                    input: vec![current.clone()],
                    name: format!("{}_{}", function.op_type(), nodes.len()),
                    op_type: function.op_type().into(),
                    attribute,
                    ..Default::default()
                }
            }
            Layer::Dropout(_) => continue,
        };
        current = format!("{}_output", node.name.replace('/', "_"));
        nodes.push(NodeProto { output: vec![current.clone()], ..node });
    }

    if let Some(last) = nodes.last_mut() {
        last.output = vec![OUTPUT_NAME.to_string()];
    }

    let graph = GraphProto {
        node: nodes,
        name: "classifier".into(),
        initializer: initializers,
        input: vec![ValueInfoProto::float_tensor(INPUT_NAME, BATCH_DIM, &[model.input_size()])],
        output: vec![ValueInfoProto::float_tensor(OUTPUT_NAME, BATCH_DIM, &[model.output_size()])],
        ..Default::default()
    };

    let hidden = model.spec.hidden_sizes.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(" -> ");
    ModelProto {
        ir_version: IR_VERSION,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET_VERSION,
        }],
        producer_name: PRODUCER_NAME.into(),
        producer_version: env!("CARGO_PKG_VERSION").into(),
        model_version: 1,
        doc_string: format!(
            "feed-forward classifier: {} -> {} -> {}",
            model.input_size(),
            hidden,
            model.output_size()
        ),
        graph: Some(graph),
        metadata_props: options.metadata
            .to_props()
            .into_iter()
            .map(|(key, value)| StringStringEntryProto { key, value })
            .collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::ArchitectureSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn model() -> Classifier {
        Classifier::new(ArchitectureSpec::new(12), &mut ChaCha8Rng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn maps_layers_to_operators() {
        let proto = build_model(&model(), &ExportOptions::default());
        let graph = proto.graph.unwrap();
        let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["Gemm", "Relu", "Gemm", "Relu", "Gemm", "Softmax"]);
        assert_eq!(graph.node[0].input[0], INPUT_NAME);
        assert_eq!(graph.node.last().unwrap().output, vec![OUTPUT_NAME.to_string()]);
        for pair in graph.node.windows(2) {
            assert_eq!(pair[1].input[0], pair[0].output[0]);
        }
    }

    #[test]
    fn embeds_every_parameter() {
        let model = model();
        let proto = build_model(&model, &ExportOptions::default());
        let graph = proto.graph.unwrap();
        assert_eq!(graph.initializer.len(), 6);
        let total: usize = graph.initializer.iter().map(|t| t.to_f32().len()).sum();
        assert_eq!(total, model.parameter_count());

        let w1 = &graph.initializer[0];
        assert_eq!(w1.name, "fc1.weight");
        assert_eq!(w1.dims, vec![12, 128]);
        assert_eq!(w1.to_f32()[1], model.dense_layers().next().unwrap().weights.data[0][1] as f32);
    }

    #[test]
    fn declares_opset_and_metadata() {
        let mut options = ExportOptions::default();
        options.metadata.output_labels = Some(vec!["happy".into(), "sad".into()]);
        let proto = build_model(&model(), &options);
        assert_eq!(proto.ir_version, IR_VERSION);
        assert_eq!(proto.opset_import[0].version, OPSET_VERSION);
        assert_eq!(proto.metadata_props[0].key, "output_labels");
        assert_eq!(proto.metadata_props[0].value, "happy,sad");
    }
}
