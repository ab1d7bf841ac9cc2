//! TensorRT-accelerated engine on top of ONNX Runtime.
//!
//! Built engines and their shape profiles are cached under `cache_dir`, so the
//! dynamic shape range collected by a warm-up run is reused by later runs.
//! CUDA and CPU providers stay registered behind TensorRT for any subgraph
//! TensorRT rejects.

use std::path::Path;

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider,
};
use ort::session::Session;
use tracing::info;

use crate::engine::{InferenceEngine, OutputTensor, Precision, TensorMap, TensorRtOptions};
use crate::onnx::{run_session, session_input_names};

pub struct TensorRtEngine {
    session: Session,
    input_names: Vec<String>,
}

impl TensorRtEngine {
    pub fn load(model_path: &Path, options: &TensorRtOptions) -> anyhow::Result<Self> {
        anyhow::ensure!(model_path.exists(), "model not found at {model_path:?}");
        info!(model = %model_path.display(), ?options, "creating tensorrt engine");

        std::fs::create_dir_all(&options.cache_dir)?;
        let cache_dir = options.cache_dir.display().to_string();

        let tensorrt = TensorRTExecutionProvider::default()
            .with_device_id(options.device_id)
            .with_max_workspace_size(options.workspace_size)
            .with_min_subgraph_size(options.min_subgraph_size)
            .with_fp16(options.precision == Precision::Half)
            .with_int8(options.precision == Precision::Int8)
            .with_engine_cache(true)
            .with_engine_cache_path(cache_dir)
            .build()
            .error_on_failure();

        let session = Session::builder()?
            .with_execution_providers([
                tensorrt,
                CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| anyhow::anyhow!("register tensorrt provider: {e}"))?
            .commit_from_file(model_path)?;

        let input_names = session_input_names(&session);
        info!(inputs = ?input_names, precision = ?options.precision, "tensorrt engine created");
        Ok(Self {
            session,
            input_names,
        })
    }
}

impl InferenceEngine for TensorRtEngine {
    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn infer(&mut self, inputs: &TensorMap) -> anyhow::Result<Vec<OutputTensor>> {
        run_session(&mut self.session, &self.input_names, inputs)
    }
}
