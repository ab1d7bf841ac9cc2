//! BIO span decoding for token classification output.
//!
//! Walks the argmax tag sequence of each example once, opening a span on a
//! begin tag and closing it on the next `O`. Token position `i` maps to raw
//! position `i - 1` because of the leading `[CLS]` token, so a span closed
//! by an `O` at token `i` covers raw positions `start..=i - 2`.
//!
//! Two edge behaviors are pinned by the tests below:
//!
//! - A begin tag while a span is open replaces the open span, which is
//!   dropped without being emitted.
//! - A span still open at the end of the sequence is emitted with an empty
//!   `entity`.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::input::RawInput;
use crate::labels::{LabelSet, OUTSIDE};

/// One detected entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    /// First raw position of the entity.
    pub start: usize,
    /// Last raw position, inclusive.
    pub end: usize,
    pub entity: String,
    /// Entity type without its `B-` prefix, e.g. `PER`.
    pub label: String,
}

impl EntitySpan {
    /// `[start, end]`, as printed in results.
    pub fn pos(&self) -> [usize; 2] {
        [self.start, self.end]
    }
}

/// Token classification result for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClassification {
    /// Detected spans per example, in closing order.
    pub value: Vec<Vec<EntitySpan>>,
    /// Argmax tag index per token, special tokens included.
    pub tokens_label: Vec<Vec<usize>>,
}

/// Decode the spans of a single example.
pub fn decode_spans(token_labels: &[usize], raw: &RawInput, labels: &LabelSet) -> Vec<EntitySpan> {
    let mut start: Option<usize> = None;
    let mut label_name = "";
    let mut items = Vec::new();

    for (i, &label) in token_labels.iter().enumerate() {
        if label == OUTSIDE
            && let Some(s) = start
        {
            items.push(EntitySpan {
                start: s,
                end: i - 2,
                entity: raw.slice(s, i - 1),
                label: label_name.to_string(),
            });
            start = None;
        } else if labels.is_begin(label) {
            // A begin tag on [CLS] leaves no span open.
            start = i.checked_sub(1);
            label_name = labels.entity_type(label).unwrap_or_default();
        }
    }

    if let Some(s) = start {
        items.push(EntitySpan {
            start: s,
            end: token_labels.len() - 2,
            entity: String::new(),
            label: label_name.to_string(),
        });
    }

    items
}

/// Decode every example of a batch; `token_labels` and `raw_inputs` are index aligned.
pub fn decode_batch(
    token_labels: &[Vec<usize>],
    raw_inputs: &[RawInput],
    labels: &LabelSet,
) -> Result<Vec<Vec<EntitySpan>>, DecodeError> {
    if token_labels.len() != raw_inputs.len() {
        return Err(DecodeError::BatchMismatch {
            labels: token_labels.len(),
            inputs: raw_inputs.len(),
        });
    }

    Ok(token_labels
        .iter()
        .zip(raw_inputs)
        .map(|(seq, raw)| decode_spans(seq, raw, labels))
        .collect())
}

/// Reduce row-major logits of shape `[batch, seq_len, num_labels]` to the
/// argmax tag index of every token.
pub fn argmax_token_labels(
    shape: &[usize],
    logits: &[f32],
) -> Result<Vec<Vec<usize>>, DecodeError> {
    let &[batch, seq_len, num_labels] = shape else {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            expected: "[batch, seq_len, num_labels]",
        });
    };
    if num_labels == 0 || logits.len() != batch * seq_len * num_labels {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            expected: "[batch, seq_len, num_labels] matching the logits",
        });
    }
    if seq_len == 0 {
        return Ok(vec![Vec::new(); batch]);
    }

    Ok(logits
        .chunks(seq_len * num_labels)
        .take(batch)
        .map(|example| example.chunks(num_labels).map(argmax).collect())
        .collect())
}

/// Index of the first maximum.
pub(crate) fn argmax(row: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}
