//! Inference engine strategy.
//!
//! An engine takes named `i64` tensors of shape `[batch, seq_len]` and returns
//! the model's `f32` output tensors. Which engine runs is decided once, from
//! the configuration and the model itself, by [`EngineKind::select`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ernie_core::{Device, PredictorConfig};
use tracing::{debug, warn};

/// A `[batch, seq_len]` integer input tensor, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTensor {
    pub shape: [usize; 2],
    pub data: Vec<i64>,
}

impl InputTensor {
    pub fn new(batch: usize, seq_len: usize, data: Vec<i64>) -> Self {
        debug_assert_eq!(data.len(), batch * seq_len);
        Self {
            shape: [batch, seq_len],
            data,
        }
    }

    pub fn zeros(batch: usize, seq_len: usize) -> Self {
        Self::new(batch, seq_len, vec![0; batch * seq_len])
    }
}

/// Input tensors keyed by model input name.
pub type TensorMap = BTreeMap<String, InputTensor>;

/// A model output, copied out of the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Input shapes used to prime an engine's dynamic shape ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeHints {
    pub min: [usize; 2],
    pub max: [usize; 2],
    pub opt: [usize; 2],
}

impl ShapeHints {
    /// Min `1 x 2`, max `batch x max_seq`, opt `batch x 32`, with sequence
    /// lengths capped at `max_seq_length`.
    pub fn for_config(max_seq_length: usize, batch_size: usize) -> Self {
        Self {
            min: [1, 2usize.min(max_seq_length)],
            max: [batch_size, max_seq_length],
            opt: [batch_size, 32usize.min(max_seq_length)],
        }
    }

    /// Shapes in the order they are fed: min, max, opt.
    pub fn shapes(&self) -> [[usize; 2]; 3] {
        [self.min, self.max, self.opt]
    }
}

/// Common contract of every inference backend.
pub trait InferenceEngine {
    /// Input names declared by the model, in declaration order.
    fn input_names(&self) -> &[String];

    /// Run one forward pass.
    ///
    /// Only tensors named in [`input_names`](Self::input_names) are fed; a
    /// declared input missing from `inputs` is an error.
    fn infer(&mut self, inputs: &TensorMap) -> anyhow::Result<Vec<OutputTensor>>;

    /// Feed zero-filled batches of each hinted shape so the runtime builds
    /// and caches its kernels for the full shape range.
    fn warm_up(&mut self, hints: &ShapeHints) -> anyhow::Result<()> {
        for [batch, seq_len] in hints.shapes() {
            let inputs: TensorMap = self
                .input_names()
                .iter()
                .map(|name| (name.clone(), InputTensor::zeros(batch, seq_len)))
                .collect();
            debug!(batch, seq_len, "warm-up pass");
            self.infer(&inputs)?;
        }
        Ok(())
    }
}

/// TensorRT engine precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Half,
    Int8,
}

/// Which backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// ONNX Runtime with the TensorRT execution provider.
    TensorRt { precision: Precision },
    /// Plain ONNX Runtime session; `quantized` loads the dynamically
    /// quantized model on CPU.
    Onnx { quantized: bool },
}

impl EngineKind {
    /// Pick the backend for a normalized config.
    ///
    /// TensorRT runs int8 models on GPU, and any fp16 request. An int8 model
    /// always runs at int8, so fp16 is dropped for it.
    pub fn select(config: &PredictorConfig, int8_model: bool) -> Self {
        if (config.device == Device::Gpu && int8_model) || config.use_fp16 {
            let precision = if int8_model {
                if config.use_fp16 {
                    warn!("loaded an int8 quantized model, use_fp16 has been turned off");
                }
                Precision::Int8
            } else {
                Precision::Half
            };
            Self::TensorRt { precision }
        } else {
            Self::Onnx {
                quantized: config.enable_quantize,
            }
        }
    }
}

/// Session options for the plain ONNX Runtime engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnnxOptions {
    /// Intra- and inter-op thread count.
    pub num_threads: usize,
    /// Register the CUDA provider ahead of the CPU one.
    pub use_cuda: bool,
}

/// Builder workspace for TensorRT, 1 GiB.
pub const WORKSPACE_SIZE: usize = 1 << 30;

/// Smallest subgraph handed to TensorRT.
pub const MIN_SUBGRAPH_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorRtOptions {
    pub precision: Precision,
    pub device_id: i32,
    pub workspace_size: usize,
    pub min_subgraph_size: usize,
    pub cache_dir: PathBuf,
}

impl TensorRtOptions {
    pub fn from_config(config: &PredictorConfig, precision: Precision) -> Self {
        Self {
            precision,
            device_id: 0,
            workspace_size: WORKSPACE_SIZE,
            min_subgraph_size: MIN_SUBGRAPH_SIZE,
            cache_dir: config.shape_cache_dir.clone(),
        }
    }
}

/// Model file and session options for one [`EngineKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePlan {
    TensorRt {
        model_path: PathBuf,
        options: TensorRtOptions,
    },
    Onnx {
        model_path: PathBuf,
        options: OnnxOptions,
    },
}

impl EnginePlan {
    /// The quantized model always runs CPU-only; CUDA is registered only on
    /// a gpu device.
    pub fn for_config(config: &PredictorConfig, kind: EngineKind) -> Self {
        match kind {
            EngineKind::TensorRt { precision } => Self::TensorRt {
                model_path: config.model_path(),
                options: TensorRtOptions::from_config(config, precision),
            },
            EngineKind::Onnx { quantized: true } => Self::Onnx {
                model_path: config.quantized_model_path(),
                options: OnnxOptions {
                    num_threads: config.num_threads,
                    use_cuda: false,
                },
            },
            EngineKind::Onnx { quantized: false } => Self::Onnx {
                model_path: config.model_path(),
                options: OnnxOptions {
                    num_threads: config.num_threads,
                    use_cuda: config.device == Device::Gpu,
                },
            },
        }
    }

    pub fn model_path(&self) -> &Path {
        match self {
            Self::TensorRt { model_path, .. } | Self::Onnx { model_path, .. } => model_path,
        }
    }
}

/// ONNX operators that only appear in quantized graphs.
const QUANTIZE_OPS: &[&[u8]] = &[
    b"QuantizeLinear",
    b"MatMulInteger",
    b"ConvInteger",
    b"QLinear",
];

const SCAN_CHUNK: usize = 1 << 20;

/// Whether the ONNX model at `path` contains quantization operators.
///
/// Operator types are stored as plain strings in the protobuf, so a byte
/// scan finds them without decoding the graph. The file is streamed in
/// chunks and the scan stops at the first match.
pub fn is_quantized_model(path: &Path) -> std::io::Result<bool> {
    let longest = QUANTIZE_OPS.iter().map(|op| op.len()).max().unwrap_or(0);
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; SCAN_CHUNK + longest];
    let mut carried = 0;

    loop {
        let read = file.read(&mut buf[carried..])?;
        if read == 0 {
            return Ok(false);
        }
        let filled = carried + read;
        if contains_quantize_op(&buf[..filled]) {
            return Ok(true);
        }
        // Keep the tail so a name split across two reads is still seen.
        carried = filled.min(longest - 1);
        buf.copy_within(filled - carried..filled, 0);
    }
}

fn contains_quantize_op(bytes: &[u8]) -> bool {
    bytes.iter().enumerate().any(|(i, &b)| {
        matches!(b, b'Q' | b'M' | b'C') && QUANTIZE_OPS.iter().any(|op| bytes[i..].starts_with(op))
    })
}
