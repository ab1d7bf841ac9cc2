pub mod config;
pub mod error;
pub mod input;
pub mod labels;
pub mod seq_cls;
pub mod span;

pub use config::{Device, PredictorConfig, Task};
pub use error::{ConfigError, DecodeError};
pub use input::RawInput;
pub use labels::LabelSet;
pub use seq_cls::{SequenceClassification, classify_sequences, score_rows};
pub use span::{EntitySpan, TokenClassification, argmax_token_labels, decode_batch, decode_spans};
