//! Inference layer: engine strategies over ONNX Runtime, tokenization, and the
//! preprocess -> infer -> postprocess pipeline.

pub mod encoder;
pub mod engine;
mod predictor;

pub use encoder::{EncodedBatch, EncodedRow, TextEncoder};
pub use engine::{
    EngineKind, EnginePlan, InferenceEngine, InputTensor, OnnxOptions, OutputTensor, Precision,
    ShapeHints, TensorMap, TensorRtOptions,
};
pub use predictor::{Prediction, Predictor};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEngine;

#[cfg(feature = "onnx")]
mod tensorrt;
#[cfg(feature = "onnx")]
pub use tensorrt::TensorRtEngine;

#[cfg(feature = "onnx")]
mod tokenizer;
#[cfg(feature = "onnx")]
pub use tokenizer::HfEncoder;
