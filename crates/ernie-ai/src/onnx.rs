//! ONNX Runtime engine for CPU, optionally CUDA-accelerated.

use std::path::Path;

use anyhow::Context;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tracing::{debug, info};

use crate::engine::{InferenceEngine, OnnxOptions, OutputTensor, TensorMap};

/// Plain ONNX Runtime session.
pub struct OnnxEngine {
    session: Session,
    input_names: Vec<String>,
}

impl OnnxEngine {
    /// Load an ONNX model file.
    pub fn load(model_path: &Path, options: OnnxOptions) -> anyhow::Result<Self> {
        anyhow::ensure!(model_path.exists(), "model not found at {model_path:?}");
        info!(model = %model_path.display(), ?options, "creating onnxruntime engine");

        let providers = if options.use_cuda {
            vec![
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ]
        } else {
            vec![CPUExecutionProvider::default().build()]
        };

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("set optimization level: {e}"))?
            .with_intra_threads(options.num_threads)
            .map_err(|e| anyhow::anyhow!("set intra-op threads: {e}"))?
            .with_inter_threads(options.num_threads)
            .map_err(|e| anyhow::anyhow!("set inter-op threads: {e}"))?
            .with_execution_providers(providers)
            .map_err(|e| anyhow::anyhow!("register execution providers: {e}"))?
            .commit_from_file(model_path)?;

        let input_names = session_input_names(&session);
        info!(inputs = ?input_names, "onnxruntime engine created");
        Ok(Self {
            session,
            input_names,
        })
    }
}

impl InferenceEngine for OnnxEngine {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn infer(&mut self, inputs: &TensorMap) -> anyhow::Result<Vec<OutputTensor>> {
        run_session(&mut self.session, &self.input_names, inputs)
    }
}

pub(crate) fn session_input_names(session: &Session) -> Vec<String> {
    session
        .inputs()
        .iter()
        .map(|input| input.name().to_string())
        .collect()
}

/// Feed the declared inputs from `inputs` and copy every output out as `f32`.
pub(crate) fn run_session(
    session: &mut Session,
    input_names: &[String],
    inputs: &TensorMap,
) -> anyhow::Result<Vec<OutputTensor>> {
    let mut feeds: Vec<(String, SessionInputValue<'static>)> = Vec::with_capacity(input_names.len());
    for name in input_names {
        let tensor = inputs
            .get(name)
            .with_context(|| format!("missing input tensor {name:?}"))?;
        let [batch, seq_len] = tensor.shape;
        let shape = [batch as i64, seq_len as i64];
        let value = Tensor::from_array((shape, tensor.data.clone().into_boxed_slice()))?;
        feeds.push((name.clone(), value.into()));
    }

    let outputs = session.run(feeds)?;

    let mut result = Vec::with_capacity(outputs.len());
    for i in 0..outputs.len() {
        let (shape, data) = outputs[i].try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        debug!(output = i, ?shape, "extracted output");
        result.push(OutputTensor {
            shape,
            data: data.to_vec(),
        });
    }
    Ok(result)
}
