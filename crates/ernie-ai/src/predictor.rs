//! Prediction pipeline: tokenize, run the engine, decode the outputs.

use anyhow::Context;
use ernie_core::{
    LabelSet, RawInput, SequenceClassification, Task, TokenClassification, argmax_token_labels,
    classify_sequences, decode_batch, score_rows,
};
use tracing::{debug, info};

use crate::encoder::TextEncoder;
use crate::engine::{InferenceEngine, OutputTensor, ShapeHints, TensorMap};

/// Decoded result for one batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    SeqCls(SequenceClassification),
    TokenCls(TokenClassification),
}

impl Prediction {
    fn empty(task: Task) -> Self {
        match task {
            Task::SeqCls => Self::SeqCls(SequenceClassification {
                labels: vec![],
                confidences: vec![],
            }),
            Task::TokenCls => Self::TokenCls(TokenClassification {
                value: vec![],
                tokens_label: vec![],
            }),
        }
    }

    /// Number of examples in the result.
    pub fn len(&self) -> usize {
        match self {
            Self::SeqCls(r) => r.len(),
            Self::TokenCls(r) => r.value.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Task-specific pipeline over an encoder and an engine.
///
/// Built once; the engine and label table are not reconfigured afterwards.
pub struct Predictor {
    task: Task,
    labels: LabelSet,
    encoder: Box<dyn TextEncoder>,
    engine: Box<dyn InferenceEngine>,
}

impl Predictor {
    pub fn new(task: Task, encoder: Box<dyn TextEncoder>, engine: Box<dyn InferenceEngine>) -> Self {
        Self {
            task,
            labels: LabelSet::token_cls(),
            encoder,
            engine,
        }
    }

    /// Build the engine and tokenizer described by a normalized config.
    #[cfg(feature = "onnx")]
    pub fn from_config(config: &ernie_core::PredictorConfig) -> anyhow::Result<Self> {
        use crate::engine::{EngineKind, EnginePlan, is_quantized_model};
        use crate::onnx::OnnxEngine;
        use crate::tensorrt::TensorRtEngine;
        use crate::tokenizer::HfEncoder;

        let model_path = config.model_path();
        anyhow::ensure!(
            model_path.exists(),
            "model.onnx not found in {:?}",
            config.model_dir
        );
        let int8_model = is_quantized_model(&model_path)
            .with_context(|| format!("reading {}", model_path.display()))?;

        let kind = EngineKind::select(config, int8_model);
        let plan = EnginePlan::for_config(config, kind);
        info!(
            ?kind,
            device = %config.device,
            int8_model,
            model = %plan.model_path().display(),
            "creating engine"
        );
        let engine: Box<dyn InferenceEngine> = match &plan {
            EnginePlan::TensorRt {
                model_path,
                options,
            } => Box::new(TensorRtEngine::load(model_path, options)?),
            EnginePlan::Onnx {
                model_path,
                options,
            } => Box::new(OnnxEngine::load(model_path, *options)?),
        };
        info!("engine created");

        let encoder = HfEncoder::load(&config.tokenizer_path(), config.max_seq_length)?;
        Ok(Self::new(config.task, Box::new(encoder), engine))
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Tokenize a batch into named input tensors.
    pub fn preprocess(&self, inputs: &[RawInput]) -> anyhow::Result<TensorMap> {
        let encoded = self.encoder.encode(inputs).context("tokenizing inputs")?;
        debug!(
            batch_size = encoded.batch_size,
            seq_len = encoded.seq_len,
            "preprocessed batch"
        );
        Ok(encoded.into_tensors())
    }

    pub fn infer(&mut self, tensors: &TensorMap) -> anyhow::Result<Vec<OutputTensor>> {
        self.engine.infer(tensors).context("running inference")
    }

    /// Decode engine outputs for the raw inputs they were computed from.
    pub fn postprocess(
        &self,
        outputs: &[OutputTensor],
        inputs: &[RawInput],
    ) -> anyhow::Result<Prediction> {
        let output = outputs
            .first()
            .context("engine returned no output tensors")?;

        match self.task {
            Task::SeqCls => {
                let rows = score_rows(&output.shape, &output.data)?;
                Ok(Prediction::SeqCls(classify_sequences(&rows)?))
            }
            Task::TokenCls => {
                let tokens_label = argmax_token_labels(&output.shape, &output.data)?;
                let value = decode_batch(&tokens_label, inputs, &self.labels)?;
                Ok(Prediction::TokenCls(TokenClassification {
                    value,
                    tokens_label,
                }))
            }
        }
    }

    /// Run the full pipeline on one batch.
    pub fn predict(&mut self, inputs: &[RawInput]) -> anyhow::Result<Prediction> {
        if inputs.is_empty() {
            return Ok(Prediction::empty(self.task));
        }
        let tensors = self.preprocess(inputs)?;
        let outputs = self.infer(&tensors)?;
        self.postprocess(&outputs, inputs)
    }

    /// Prime the engine over the shape range implied by the sequence length
    /// and batch size.
    pub fn set_dynamic_shape(
        &mut self,
        max_seq_length: usize,
        batch_size: usize,
    ) -> anyhow::Result<()> {
        let hints = ShapeHints::for_config(max_seq_length, batch_size);
        info!(?hints, "collecting dynamic shapes");
        self.engine.warm_up(&hints).context("warming up engine")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncodedBatch, EncodedRow};
    use ernie_core::EntitySpan;
    use std::cell::RefCell;
    use std::rc::Rc;

    const CLS: u32 = 1;
    const SEP: u32 = 2;

    /// One id per character or token, wrapped in [CLS] ... [SEP].
    struct CharEncoder;

    impl TextEncoder for CharEncoder {
        fn encode(&self, inputs: &[RawInput]) -> anyhow::Result<EncodedBatch> {
            let ids: Vec<Vec<u32>> = inputs
                .iter()
                .map(|raw| {
                    let mut row = vec![CLS];
                    row.extend((0..raw.len()).map(|i| 100 + i as u32));
                    row.push(SEP);
                    row
                })
                .collect();
            let zeros: Vec<Vec<u32>> = ids.iter().map(|r| vec![0; r.len()]).collect();
            let ones: Vec<Vec<u32>> = ids.iter().map(|r| vec![1; r.len()]).collect();
            Ok(EncodedBatch::from_rows(ids.iter().enumerate().map(|(i, r)| {
                EncodedRow {
                    ids: r,
                    type_ids: &zeros[i],
                    attention_mask: &ones[i],
                }
            })))
        }
    }

    /// Emits one-hot logits for a scripted tag per token.
    struct ScriptedEngine {
        names: Vec<String>,
        tags: Vec<Vec<usize>>,
        num_labels: usize,
        seen: Rc<RefCell<Vec<[usize; 2]>>>,
    }

    impl ScriptedEngine {
        fn new(tags: Vec<Vec<usize>>, num_labels: usize) -> Self {
            Self {
                names: vec!["input_ids".into(), "token_type_ids".into()],
                tags,
                num_labels,
                seen: Rc::default(),
            }
        }
    }

    impl InferenceEngine for ScriptedEngine {
        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn infer(&mut self, inputs: &TensorMap) -> anyhow::Result<Vec<OutputTensor>> {
            let ids = inputs.get("input_ids").context("missing input_ids")?;
            let [batch, seq_len] = ids.shape;
            self.seen.borrow_mut().push(ids.shape);

            let mut data = vec![0.0f32; batch * seq_len * self.num_labels];
            for b in 0..batch {
                for t in 0..seq_len {
                    let tag = self.tags.get(b).and_then(|s| s.get(t)).copied().unwrap_or(0);
                    data[(b * seq_len + t) * self.num_labels + tag] = 1.0;
                }
            }
            Ok(vec![OutputTensor {
                shape: vec![batch, seq_len, self.num_labels],
                data,
            }])
        }
    }

    struct ScoreEngine {
        names: Vec<String>,
        scores: Vec<Vec<f32>>,
    }

    impl InferenceEngine for ScoreEngine {
        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn infer(&mut self, _inputs: &TensorMap) -> anyhow::Result<Vec<OutputTensor>> {
            Ok(vec![OutputTensor {
                shape: vec![self.scores.len(), self.scores[0].len()],
                data: self.scores.concat(),
            }])
        }
    }

    #[test]
    fn token_cls_pipeline() {
        // [CLS] 张 三 在 北 京 [SEP]
        let engine = ScriptedEngine::new(vec![vec![0, 1, 2, 0, 5, 6, 0]], 7);
        let mut predictor = Predictor::new(Task::TokenCls, Box::new(CharEncoder), Box::new(engine));

        let inputs = vec![RawInput::from("张三在北京")];
        let Prediction::TokenCls(result) = predictor.predict(&inputs).unwrap() else {
            panic!("expected token classification");
        };

        assert_eq!(result.tokens_label, vec![vec![0, 1, 2, 0, 5, 6, 0]]);
        assert_eq!(
            result.value,
            vec![vec![
                EntitySpan {
                    start: 0,
                    end: 1,
                    entity: "张三".into(),
                    label: "PER".into(),
                },
                EntitySpan {
                    start: 3,
                    end: 4,
                    entity: "北京".into(),
                    label: "LOC".into(),
                },
            ]]
        );
    }

    #[test]
    fn token_cls_padded_batch() {
        let engine = ScriptedEngine::new(
            vec![vec![0, 3, 4, 4, 0, 0], vec![0, 0, 1, 2, 2, 2, 2]],
            7,
        );
        let mut predictor = Predictor::new(Task::TokenCls, Box::new(CharEncoder), Box::new(engine));

        let inputs = vec![RawInput::from("中国银行"), RawInput::chars("我叫李小龙")];
        let Prediction::TokenCls(result) = predictor.predict(&inputs).unwrap() else {
            panic!("expected token classification");
        };

        assert_eq!(result.value.len(), 2);
        assert_eq!(result.value[0][0].entity, "中国银");
        assert_eq!(result.value[0][0].label, "ORG");
        // Still open at the end of the sequence.
        assert_eq!(result.value[1][0].label, "PER");
        assert_eq!(result.value[1][0].entity, "");
        assert_eq!(result.value[1][0].pos(), [1, 5]);
    }

    #[test]
    fn seq_cls_pipeline() {
        let engine = ScoreEngine {
            names: vec!["input_ids".into()],
            scores: vec![vec![0.1, 0.7, 0.2], vec![0.6, 0.3, 0.1]],
        };
        let mut predictor = Predictor::new(Task::SeqCls, Box::new(CharEncoder), Box::new(engine));

        let inputs = vec![RawInput::from("好"), RawInput::from("坏")];
        let Prediction::SeqCls(result) = predictor.predict(&inputs).unwrap() else {
            panic!("expected sequence classification");
        };
        assert_eq!(result.labels, vec![1, 0]);
        assert_eq!(result.confidences, vec![0.7, 0.6]);
    }

    #[test]
    fn empty_batch_skips_engine() {
        let engine = ScriptedEngine::new(vec![], 7);
        let seen = Rc::clone(&engine.seen);
        let mut predictor = Predictor::new(Task::TokenCls, Box::new(CharEncoder), Box::new(engine));

        let result = predictor.predict(&[]).unwrap();
        assert!(result.is_empty());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn seq_cls_rejects_token_shaped_output() {
        let engine = ScriptedEngine::new(vec![vec![0, 0, 0]], 7);
        let mut predictor = Predictor::new(Task::SeqCls, Box::new(CharEncoder), Box::new(engine));
        assert!(predictor.predict(&[RawInput::from("a")]).is_err());
    }

    #[test]
    fn postprocess_requires_an_output() {
        let predictor = Predictor::new(
            Task::TokenCls,
            Box::new(CharEncoder),
            Box::new(ScriptedEngine::new(vec![], 7)),
        );
        let err = predictor.postprocess(&[], &[]).unwrap_err();
        assert!(err.to_string().contains("no output tensors"));
    }

    #[test]
    fn set_dynamic_shape_feeds_min_max_opt() {
        let engine = ScriptedEngine::new(vec![], 7);
        let seen = Rc::clone(&engine.seen);
        let mut predictor = Predictor::new(Task::TokenCls, Box::new(CharEncoder), Box::new(engine));

        predictor.set_dynamic_shape(128, 32).unwrap();
        assert_eq!(*seen.borrow(), vec![[1, 2], [32, 128], [32, 32]]);
    }

    #[test]
    fn repeated_predictions_match() {
        let engine = ScriptedEngine::new(vec![vec![0, 1, 2, 0]], 7);
        let mut predictor = Predictor::new(Task::TokenCls, Box::new(CharEncoder), Box::new(engine));
        let inputs = vec![RawInput::from("张三")];

        let first = predictor.predict(&inputs).unwrap();
        let second = predictor.predict(&inputs).unwrap();
        assert_eq!(first, second);
        assert_eq!(predictor.task(), Task::TokenCls);
    }
}
