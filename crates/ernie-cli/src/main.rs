mod display;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use ernie_ai::{Prediction, Predictor};
use ernie_core::{Device, PredictorConfig, RawInput, Task};
use tracing::info;

const TOKEN_CLS_SAMPLES: &[&str] = &[
    "北京的涮肉，重庆的火锅，成都的小吃都是极具特色的美食。",
    "乔丹、科比、詹姆斯和姚明都是篮球界的标志性人物。",
];

const SEQ_CLS_SAMPLES: &[&str] = &[
    "未来自动驾驶真的会让酒驾和疲劳驾驶成历史吗？",
    "黄磊接受华少快问快答，不光悉数相关趣事，还真诚表达了对妻子的爱。",
];

/// Run ERNIE sequence or token classification on ONNX Runtime or TensorRT.
#[derive(Debug, Parser)]
#[command(name = "ernie", version)]
struct Cli {
    /// JSON config file; flags given on the command line override it.
    #[arg(long, env = "ERNIE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory containing model.onnx and tokenizer.json.
    #[arg(long, env = "ERNIE_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// seq_cls or token_cls.
    #[arg(long, env = "ERNIE_TASK")]
    task: Option<Task>,

    /// cpu or gpu.
    #[arg(long, env = "ERNIE_DEVICE")]
    device: Option<Device>,

    #[arg(long)]
    max_seq_length: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Half precision TensorRT engine (gpu only).
    #[arg(long)]
    use_fp16: bool,

    /// Run the dynamically-quantized model_quantized.onnx (cpu only).
    #[arg(long)]
    enable_quantize: bool,

    /// Collect TensorRT dynamic shapes, then exit.
    #[arg(long)]
    set_dynamic_shape: bool,

    #[arg(long)]
    num_threads: Option<usize>,

    /// TensorRT engine cache directory.
    #[arg(long)]
    shape_cache_dir: Option<PathBuf>,

    /// Input text; repeat for a batch.
    #[arg(short, long = "input")]
    inputs: Vec<String>,

    /// File with one input per line.
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Split each input into per-character tokens.
    #[arg(long)]
    split_chars: bool,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Merge the config file (if any) with command line overrides.
    fn predictor_config(&self) -> anyhow::Result<PredictorConfig> {
        let mut config = match &self.config {
            Some(path) => PredictorConfig::from_json_file(path)?,
            None => {
                let model_dir = self
                    .model_dir
                    .clone()
                    .context("--model-dir is required without --config")?;
                let task = self.task.context("--task is required without --config")?;
                PredictorConfig::new(model_dir, task)
            }
        };

        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(task) = self.task {
            config.task = task;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(n) = self.max_seq_length {
            config.max_seq_length = n;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.num_threads {
            config.num_threads = n;
        }
        if let Some(dir) = &self.shape_cache_dir {
            config.shape_cache_dir = dir.clone();
        }
        config.use_fp16 |= self.use_fp16;
        config.enable_quantize |= self.enable_quantize;
        config.set_dynamic_shape |= self.set_dynamic_shape;

        Ok(config.normalized()?)
    }

    fn raw_inputs(&self, task: Task) -> anyhow::Result<Vec<RawInput>> {
        let mut lines: Vec<String> = self.inputs.clone();
        if let Some(path) = &self.input_file {
            lines.extend(read_lines(path)?);
        }
        if lines.is_empty() {
            let samples = match task {
                Task::TokenCls => TOKEN_CLS_SAMPLES,
                Task::SeqCls => SEQ_CLS_SAMPLES,
            };
            lines = samples.iter().map(|s| s.to_string()).collect();
        }

        Ok(lines
            .into_iter()
            .map(|line| {
                if self.split_chars {
                    RawInput::chars(&line)
                } else {
                    RawInput::Text(line)
                }
            })
            .collect())
    }
}

/// Non-empty, trimmed lines of `path`.
fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("ernie v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = cli.predictor_config()?;
    info!(
        task = %config.task,
        device = %config.device,
        model_dir = %config.model_dir.display(),
        "starting predictor"
    );

    let mut predictor = Predictor::from_config(&config)?;

    if config.set_dynamic_shape {
        predictor.set_dynamic_shape(config.max_seq_length, config.batch_size)?;
        println!("Set dynamic shape finished, please close set_dynamic_shape and restart.");
        return Ok(());
    }

    let inputs = cli.raw_inputs(config.task)?;
    let total = inputs.len();
    let mut predictions: Vec<Prediction> = Vec::new();
    let mut done = 0;
    for chunk in inputs.chunks(config.batch_size) {
        predictions.push(predictor.predict(chunk)?);
        done += chunk.len();
        info!(done, total, "predicted batch");
    }

    let chunks = inputs.chunks(config.batch_size).zip(&predictions);
    if cli.json {
        let records: Vec<display::Record<'_>> = chunks
            .flat_map(|(chunk, prediction)| {
                display::records(chunk, prediction, &config.seq_cls_labels)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for (chunk, prediction) in chunks {
            print!("{}", display::render(chunk, prediction, &config.seq_cls_labels));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};
    use std::io::Write;

    /// Parse `args` with the `ERNIE_*` environment fallbacks switched off.
    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let command = ["config", "model_dir", "task", "device"]
            .into_iter()
            .fold(Cli::command(), |cmd, id| {
                cmd.mut_arg(id, |arg| arg.env(None::<&'static str>))
            });
        let matches =
            command.try_get_matches_from(std::iter::once("ernie").chain(args.iter().copied()))?;
        Cli::from_arg_matches(&matches)
    }

    fn parse(args: &[&str]) -> Cli {
        try_parse(args).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn unsupported_task_fails_fast() {
        let err = try_parse(&["--model-dir", "m", "--task", "qa"]).unwrap_err();
        assert!(err.to_string().contains("seq_cls and token_cls"));
    }

    #[test]
    fn unsupported_device_fails_fast() {
        let err = try_parse(&["--task", "seq_cls", "--device", "tpu"]).unwrap_err();
        assert!(err.to_string().contains("cpu or gpu"));
    }

    #[test]
    fn environment_does_not_leak_into_parsing() {
        let command = Cli::command();
        let env_args: Vec<&str> = command
            .get_arguments()
            .filter(|arg| arg.get_env().is_some())
            .map(|arg| arg.get_id().as_str())
            .collect();
        assert_eq!(env_args, vec!["config", "model_dir", "task", "device"]);

        let cli = parse(&[]);
        assert!(cli.config.is_none());
        assert!(cli.model_dir.is_none());
        assert!(cli.task.is_none());
        assert!(cli.device.is_none());
    }

    #[test]
    fn device_flag_is_case_insensitive() {
        let cli = parse(&["--model-dir", "m", "--task", "token_cls", "--device", "GPU"]);
        assert_eq!(cli.device, Some(Device::Gpu));
    }

    #[test]
    fn flags_build_normalized_config() {
        let cli = parse(&[
            "--model-dir",
            "m",
            "--task",
            "token_cls",
            "--use-fp16",
            "--batch-size",
            "8",
        ]);
        let config = cli.predictor_config().unwrap();
        assert_eq!(config.task, Task::TokenCls);
        // cpu is the default device and drops fp16 and custom batch sizes.
        assert!(!config.use_fp16);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn missing_model_dir() {
        let cli = parse(&["--task", "seq_cls"]);
        let err = cli.predictor_config().unwrap_err();
        assert!(err.to_string().contains("--model-dir"));
    }

    #[test]
    fn config_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model_dir": "from_file", "task": "seq_cls", "device": "gpu", "batch_size": 4}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--config", path, "--batch-size", "16", "--use-fp16"]);
        let config = cli.predictor_config().unwrap();
        assert_eq!(config.model_dir, PathBuf::from("from_file"));
        assert_eq!(config.device, Device::Gpu);
        assert_eq!(config.batch_size, 16);
        assert!(config.use_fp16);
    }

    #[test]
    fn inputs_from_flags_and_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "第二句\n\n  第三句  ").unwrap();
        let path = file.path().to_str().unwrap();

        let cli = parse(&["--task", "token_cls", "-i", "第一句", "--input-file", path]);
        let inputs = cli.raw_inputs(Task::TokenCls).unwrap();
        assert_eq!(
            inputs,
            vec![
                RawInput::from("第一句"),
                RawInput::from("第二句"),
                RawInput::from("第三句"),
            ]
        );
    }

    #[test]
    fn split_chars_pretokenizes() {
        let cli = parse(&["--task", "token_cls", "-i", "李白", "--split-chars"]);
        let inputs = cli.raw_inputs(Task::TokenCls).unwrap();
        assert_eq!(inputs, vec![RawInput::chars("李白")]);
    }

    #[test]
    fn samples_when_no_inputs() {
        let cli = parse(&["--task", "seq_cls"]);
        let inputs = cli.raw_inputs(Task::SeqCls).unwrap();
        assert_eq!(inputs.len(), SEQ_CLS_SAMPLES.len());
    }
}
