//! ONNX Runtime sequence-classification model for NLI checkpoints.
//!
//! Expects an exported `AutoModelForSequenceClassification` graph taking
//! `input_ids` and `attention_mask` (plus `token_type_ids` for BERT-style
//! exports) and producing `[batch, num_classes]` logits. ONNX inference
//! graphs carry no dropout or gradient state, so a loaded session is already
//! frozen for inference.

use anyhow::Context;
use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use tokenizers::{PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{info, warn};

use crate::checkpoint::{CheckpointFiles, ModelConfig};
use crate::classifier::NliModel;
use crate::device::Device;

/// How to load each model copy.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Device the session runs on, as returned by [`select_device`].
    pub device: Device,
    /// Upper bound on the tokenized length of a premise/hypothesis pair.
    pub max_length: usize,
    /// Intra-op threads per session; `None` lets ONNX Runtime decide.
    pub intra_threads: Option<usize>,
}

/// Decide where models run.
///
/// A CUDA request falls back to CPU with a warning when no CUDA execution
/// provider is available, unless `strict` is set.
pub fn select_device(requested: Device, strict: bool) -> anyhow::Result<Device> {
    match requested {
        Device::Cpu => Ok(Device::Cpu),
        Device::Cuda => {
            let available = CUDAExecutionProvider::default()
                .is_available()
                .unwrap_or(false);
            if available {
                Ok(Device::Cuda)
            } else if strict {
                anyhow::bail!("CUDA requested but no CUDA execution provider is available")
            } else {
                warn!("CUDA requested but unavailable, falling back to CPU");
                Ok(Device::Cpu)
            }
        }
    }
}

/// NLI classifier backed by an ONNX Runtime session.
pub struct OnnxNliModel {
    session: Session,
    tokenizer: Tokenizer,
    num_classes: usize,
    uses_token_type_ids: bool,
}

impl OnnxNliModel {
    /// Load the ONNX graph and tokenizer of a resolved checkpoint.
    pub fn load(
        files: &CheckpointFiles,
        config: &ModelConfig,
        opts: &LoadOptions,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(opts.max_length > 0, "max_length must be positive");

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("set optimization level: {e}"))?;
        if let Some(threads) = opts.intra_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(|e| anyhow::anyhow!("set intra threads: {e}"))?;
        }
        if opts.device == Device::Cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .map_err(|e| anyhow::anyhow!("register CUDA execution provider: {e}"))?;
        }
        let session = builder.commit_from_file(&files.model)?;

        let uses_token_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");

        // Output shape is usually [batch, classes] with a static class axis.
        let logits_output = session
            .outputs()
            .first()
            .context("ONNX graph declares no outputs")?;
        let num_classes = infer_classes(logits_output.dtype())
            .or(config.num_labels())
            .unwrap_or(3);

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;

        // Pairs are truncated longest-first so the joint length fits.
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: opts.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        // Keep the tokenizer's own pad token if it has one, else use config's.
        let mut padding = tokenizer.get_padding().cloned().unwrap_or_default();
        if tokenizer.get_padding().is_none()
            && let Some(pad_id) = config.pad_token_id
        {
            padding.pad_id = pad_id;
            if let Some(token) = tokenizer.id_to_token(pad_id) {
                padding.pad_token = token;
            }
        }
        padding.strategy = PaddingStrategy::BatchLongest;
        tokenizer.with_padding(Some(padding));

        info!(
            model = %files.model.display(),
            device = %opts.device,
            num_classes,
            max_length = opts.max_length,
            uses_token_type_ids,
            "loaded NLI model"
        );
        Ok(Self {
            session,
            tokenizer,
            num_classes,
            uses_token_type_ids,
        })
    }
}

impl NliModel for OnnxNliModel {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn forward(&mut self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<Vec<f32>>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(pairs.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let shape = [encodings.len() as i64, seq_len as i64];
        let tensor = |rows: Vec<&[u32]>| Tensor::from_array((shape, pack_rows(&rows, seq_len)));

        let ids = tensor(encodings.iter().map(|e| e.get_ids()).collect())?;
        let mask = tensor(encodings.iter().map(|e| e.get_attention_mask()).collect())?;

        let outputs = if self.uses_token_type_ids {
            let types = tensor(encodings.iter().map(|e| e.get_type_ids()).collect())?;
            self.session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
                "token_type_ids" => types,
            ])?
        } else {
            self.session.run(ort::inputs![
                "input_ids" => ids,
                "attention_mask" => mask,
            ])?
        };

        let (dims, logits) = outputs[0].try_extract_tensor::<f32>()?;
        split_logits(dims, logits, pairs.len(), self.num_classes)
    }
}

/// Right-pad token rows with zeros into one row-major `[rows, seq_len]` buffer.
fn pack_rows(rows: &[&[u32]], seq_len: usize) -> Box<[i64]> {
    let mut flat = vec![0i64; rows.len() * seq_len];
    for (row, out) in rows.iter().zip(flat.chunks_mut(seq_len.max(1))) {
        for (slot, &token) in out.iter_mut().zip(row.iter()) {
            *slot = i64::from(token);
        }
    }
    flat.into_boxed_slice()
}

/// Split a `[batch, classes]` logits buffer into one row per pair.
fn split_logits(
    dims: &[i64],
    data: &[f32],
    batch_size: usize,
    num_classes: usize,
) -> anyhow::Result<Vec<Vec<f32>>> {
    anyhow::ensure!(
        dims == [batch_size as i64, num_classes as i64] && num_classes > 0,
        "unexpected logits shape {dims:?}, expected [{batch_size}, {num_classes}]"
    );
    anyhow::ensure!(
        data.len() == batch_size * num_classes,
        "logits buffer holds {} values for shape {dims:?}",
        data.len()
    );
    Ok(data.chunks(num_classes).map(<[f32]>::to_vec).collect())
}

/// Try to infer the class count from the ONNX model output type.
fn infer_classes(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
