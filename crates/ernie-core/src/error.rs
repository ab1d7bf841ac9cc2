use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("task_name only supports seq_cls and token_cls, got: {0}")]
    UnsupportedTask(String),

    #[error("device must be cpu or gpu, got: {0}")]
    UnsupportedDevice(String),

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("reading config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("batch mismatch: {labels} label sequences for {inputs} raw inputs")]
    BatchMismatch { labels: usize, inputs: usize },

    #[error("empty score vector at batch index {0}")]
    EmptyScores(usize),

    #[error("unexpected output shape {shape:?}, expected {expected}")]
    Shape {
        shape: Vec<usize>,
        expected: &'static str,
    },
}
