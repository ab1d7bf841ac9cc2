//! Tokenization seam: raw inputs to padded `[batch, seq_len]` id tensors.

use ernie_core::RawInput;

use crate::engine::{InputTensor, TensorMap};

/// Turns a batch of raw inputs into model ids, padded to a common length.
pub trait TextEncoder {
    fn encode(&self, inputs: &[RawInput]) -> anyhow::Result<EncodedBatch>;
}

/// Flat row-major id tensors for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedBatch {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

/// Ids, type ids and attention mask of one encoded example.
pub struct EncodedRow<'a> {
    pub ids: &'a [u32],
    pub type_ids: &'a [u32],
    pub attention_mask: &'a [u32],
}

impl EncodedBatch {
    /// Pack rows of possibly different lengths, zero-padding each to the
    /// longest row.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = EncodedRow<'a>>) -> Self {
        let rows: Vec<EncodedRow<'a>> = rows.into_iter().collect();
        let batch_size = rows.len();
        let seq_len = rows.iter().map(|r| r.ids.len()).max().unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut token_type_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];

        for (i, row) in rows.iter().enumerate() {
            let offset = i * seq_len;
            for (j, &id) in row.ids.iter().enumerate() {
                input_ids[offset + j] = id as i64;
            }
            for (j, &tid) in row.type_ids.iter().take(seq_len).enumerate() {
                token_type_ids[offset + j] = tid as i64;
            }
            for (j, &mask) in row.attention_mask.iter().take(seq_len).enumerate() {
                attention_mask[offset + j] = mask as i64;
            }
        }

        Self {
            batch_size,
            seq_len,
            input_ids,
            token_type_ids,
            attention_mask,
        }
    }

    /// Named input tensors: `input_ids`, `token_type_ids`, `attention_mask`.
    pub fn into_tensors(self) -> TensorMap {
        let (batch, seq) = (self.batch_size, self.seq_len);
        TensorMap::from([
            ("input_ids".to_string(), InputTensor::new(batch, seq, self.input_ids)),
            (
                "token_type_ids".to_string(),
                InputTensor::new(batch, seq, self.token_type_ids),
            ),
            (
                "attention_mask".to_string(),
                InputTensor::new(batch, seq, self.attention_mask),
            ),
        ])
    }
}
