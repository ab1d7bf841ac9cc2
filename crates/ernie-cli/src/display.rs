//! Result rendering: the human-readable printout and JSON records.

use ernie_ai::Prediction;
use ernie_core::{EntitySpan, RawInput, SequenceClassification, TokenClassification};
use serde::Serialize;

const SEPARATOR: &str = "-----------------------------";

// ── Printout ──

/// Entities detected in each input, one block per input.
pub fn render_token_cls(inputs: &[RawInput], result: &TokenClassification) -> String {
    let mut out = String::new();
    for (input, spans) in inputs.iter().zip(&result.value) {
        out.push_str(&format!("input data: {input}\n"));
        out.push_str("The model detects all entities:\n");
        for span in spans {
            let [start, end] = span.pos();
            out.push_str(&format!(
                "entity: {}   label: {}   pos: [{start}, {end}]\n",
                span.entity, span.label
            ));
        }
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

/// Predicted class and confidence per input.
pub fn render_seq_cls(
    inputs: &[RawInput],
    result: &SequenceClassification,
    label_names: &[String],
) -> String {
    let mut out = String::new();
    for (input, (label, confidence)) in inputs.iter().zip(result.iter()) {
        out.push_str(&format!("input data: {input}\n"));
        let label = match label_names.get(label) {
            Some(name) => format!("{label} ({name})"),
            None => label.to_string(),
        };
        out.push_str(&format!("label: {label}   confidence: {confidence:.4}\n"));
        out.push_str(SEPARATOR);
        out.push('\n');
    }
    out
}

pub fn render(inputs: &[RawInput], prediction: &Prediction, label_names: &[String]) -> String {
    match prediction {
        Prediction::TokenCls(r) => render_token_cls(inputs, r),
        Prediction::SeqCls(r) => render_seq_cls(inputs, r, label_names),
    }
}

// ── JSON records ──

/// One input and its result, for `--json` output.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Record<'a> {
    TokenCls {
        input: &'a RawInput,
        entities: &'a [EntitySpan],
        tokens_label: &'a [usize],
    },
    SeqCls {
        input: &'a RawInput,
        label: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        label_name: Option<&'a str>,
        confidence: f32,
    },
}

pub fn records<'a>(
    inputs: &'a [RawInput],
    prediction: &'a Prediction,
    label_names: &'a [String],
) -> Vec<Record<'a>> {
    match prediction {
        Prediction::TokenCls(r) => inputs
            .iter()
            .zip(r.value.iter().zip(&r.tokens_label))
            .map(|(input, (spans, tags))| Record::TokenCls {
                input,
                entities: spans,
                tokens_label: tags,
            })
            .collect(),
        Prediction::SeqCls(r) => inputs
            .iter()
            .zip(r.iter())
            .map(|(input, (label, confidence))| Record::SeqCls {
                input,
                label,
                label_name: label_names.get(label).map(String::as_str),
                confidence,
            })
            .collect(),
    }
}
