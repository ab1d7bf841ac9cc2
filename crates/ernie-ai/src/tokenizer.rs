//! `tokenizer.json` backed encoder.

use std::path::Path;

use ernie_core::RawInput;
use tokenizers::{EncodeInput, InputSequence, Tokenizer};
use tracing::{debug, info};

use crate::encoder::{EncodedBatch, EncodedRow, TextEncoder};

/// Hugging Face tokenizer configured to truncate at `max_seq_length` and pad
/// every batch to its longest example.
pub struct HfEncoder {
    tokenizer: Tokenizer,
}

impl HfEncoder {
    /// Load `tokenizer.json` and configure truncation and padding.
    pub fn load(tokenizer_path: &Path, max_seq_length: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {tokenizer_path:?}"
        );

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: max_seq_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));

        info!(max_seq_length, tokenizer = %tokenizer_path.display(), "loaded tokenizer");
        Ok(Self { tokenizer })
    }
}

impl TextEncoder for HfEncoder {
    fn encode(&self, inputs: &[RawInput]) -> anyhow::Result<EncodedBatch> {
        if inputs.is_empty() {
            return Ok(EncodedBatch::default());
        }

        let batch: Vec<EncodeInput<'_>> = inputs
            .iter()
            .map(|raw| match raw {
                RawInput::Text(text) => EncodeInput::Single(InputSequence::from(text.as_str())),
                RawInput::Tokens(words) => {
                    let words: Vec<&str> = words.iter().map(String::as_str).collect();
                    EncodeInput::Single(InputSequence::from(words))
                }
            })
            .collect();

        let encodings = self
            .tokenizer
            .encode_batch(batch, true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let encoded = EncodedBatch::from_rows(encodings.iter().map(|e| EncodedRow {
            ids: e.get_ids(),
            type_ids: e.get_type_ids(),
            attention_mask: e.get_attention_mask(),
        }));
        debug!(
            batch_size = encoded.batch_size,
            seq_len = encoded.seq_len,
            "encoded batch"
        );
        Ok(encoded)
    }
}
