//! Predictor configuration shared by the inference layer and the CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Batch size forced on CPU.
pub const CPU_BATCH_SIZE: usize = 32;

/// Model head the predictor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Sequence classification: one class per input.
    SeqCls,
    /// Token classification: BIO tags decoded into entity spans.
    TokenCls,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeqCls => "seq_cls",
            Self::TokenCls => "token_cls",
        }
    }
}

impl FromStr for Task {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seq_cls" => Ok(Self::SeqCls),
            "token_cls" => Ok(Self::TokenCls),
            other => Err(ConfigError::UnsupportedTask(other.to_string())),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

/// Case-insensitive: `GPU` and `gpu` are the same device.
impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            _ => Err(ConfigError::UnsupportedDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to build a predictor.
///
/// The model directory must contain `model.onnx` and `tokenizer.json`, plus
/// `model_quantized.onnx` when `enable_quantize` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub model_dir: PathBuf,
    pub task: Task,
    #[serde(default)]
    pub device: Device,
    #[serde(default = "default_max_seq_length")]
    pub max_seq_length: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub use_fp16: bool,
    /// Run the dynamically-quantized model on CPU.
    #[serde(default)]
    pub enable_quantize: bool,
    /// Warm up the engine over the min/max/opt shapes, then stop.
    #[serde(default)]
    pub set_dynamic_shape: bool,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// TensorRT engine and shape profile cache.
    #[serde(default = "default_shape_cache_dir")]
    pub shape_cache_dir: PathBuf,
    /// Optional class names for sequence classification output.
    #[serde(default)]
    pub seq_cls_labels: Vec<String>,
}

fn default_max_seq_length() -> usize {
    128
}

fn default_batch_size() -> usize {
    CPU_BATCH_SIZE
}

fn default_num_threads() -> usize {
    10
}

fn default_shape_cache_dir() -> PathBuf {
    PathBuf::from("shape_info")
}

impl PredictorConfig {
    pub fn new(model_dir: impl Into<PathBuf>, task: Task) -> Self {
        Self {
            model_dir: model_dir.into(),
            task,
            device: Device::default(),
            max_seq_length: default_max_seq_length(),
            batch_size: default_batch_size(),
            use_fp16: false,
            enable_quantize: false,
            set_dynamic_shape: false,
            num_threads: default_num_threads(),
            shape_cache_dir: default_shape_cache_dir(),
            seq_cls_labels: Vec::new(),
        }
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply the per-device overrides and validate sizes.
    ///
    /// - CPU: no fp16, no dynamic shape collection, batch size 32.
    /// - GPU: one thread per available core, no dynamic quantization.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        match self.device {
            Device::Cpu => {
                if self.use_fp16 {
                    warn!("use_fp16 requires a gpu device, disabling");
                }
                if self.set_dynamic_shape {
                    warn!("set_dynamic_shape requires a gpu device, disabling");
                }
                self.use_fp16 = false;
                self.set_dynamic_shape = false;
                self.batch_size = CPU_BATCH_SIZE;
            }
            Device::Gpu => {
                if self.enable_quantize {
                    warn!("enable_quantize is cpu only, disabling");
                }
                self.num_threads = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(self.num_threads);
                self.enable_quantize = false;
            }
        }

        if self.max_seq_length == 0 {
            return Err(ConfigError::Zero {
                field: "max_seq_length",
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero {
                field: "batch_size",
            });
        }
        if self.num_threads == 0 {
            return Err(ConfigError::Zero {
                field: "num_threads",
            });
        }
        Ok(self)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("model.onnx")
    }

    pub fn quantized_model_path(&self) -> PathBuf {
        self.model_dir.join("model_quantized.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }

    /// Display name for a sequence classification label, if configured.
    pub fn seq_cls_label_name(&self, label: usize) -> Option<&str> {
        self.seq_cls_labels.get(label).map(String::as_str)
    }
}
