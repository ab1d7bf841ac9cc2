//! Sequence classification postprocessing.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::span::argmax;

/// Predicted class and its raw score per example.
///
/// `confidences` holds the maximum engine score as-is; it is only a
/// probability if the exported model ends in a softmax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceClassification {
    pub labels: Vec<usize>,
    pub confidences: Vec<f32>,
}

impl SequenceClassification {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate over `(label, confidence)` pairs in batch order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.labels.iter().copied().zip(self.confidences.iter().copied())
    }
}

/// Arg-max and max of each score row.
pub fn classify_sequences<R: AsRef<[f32]>>(
    scores: &[R],
) -> Result<SequenceClassification, DecodeError> {
    let mut labels = Vec::with_capacity(scores.len());
    let mut confidences = Vec::with_capacity(scores.len());

    for (i, row) in scores.iter().enumerate() {
        let row = row.as_ref();
        if row.is_empty() {
            return Err(DecodeError::EmptyScores(i));
        }
        let best = argmax(row);
        labels.push(best);
        confidences.push(row[best]);
    }

    Ok(SequenceClassification {
        labels,
        confidences,
    })
}

/// Split row-major `[batch, num_classes]` scores into rows.
pub fn score_rows<'a>(shape: &[usize], scores: &'a [f32]) -> Result<Vec<&'a [f32]>, DecodeError> {
    let &[batch, num_classes] = shape else {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            expected: "[batch, num_classes]",
        });
    };
    if num_classes == 0 || scores.len() != batch * num_classes {
        return Err(DecodeError::Shape {
            shape: shape.to_vec(),
            expected: "[batch, num_classes] matching the scores",
        });
    }
    Ok(scores.chunks(num_classes).collect())
}
