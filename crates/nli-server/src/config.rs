//! Startup configuration, read once from flags and environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use nli_ai::{Device, HubClient};
use nli_core::LabelMap;

#[derive(Parser, Debug, Clone)]
#[command(name = "nli-service", version, about = "Natural language inference over HTTP")]
pub struct Config {
    /// Hub model id (`org/name`) or path to a checkpoint directory
    #[arg(long, env = "NLI_MODEL", default_value = "microsoft/deberta-v3-large-mnli")]
    pub model: String,

    /// Compute device: cpu or cuda
    #[arg(long, env = "DEVICE", default_value = "cpu")]
    pub device: Device,

    /// Fail at startup instead of falling back to CPU when CUDA is unavailable
    #[arg(long, env = "STRICT_DEVICE", value_parser = BoolishValueParser::new())]
    pub strict_device: bool,

    /// Maximum tokenized length of a premise/hypothesis pair
    #[arg(long, env = "MAX_LENGTH", default_value_t = 256)]
    pub max_length: usize,

    /// Characters kept from each premise and hypothesis [default: max-length]
    #[arg(long, env = "MAX_CHARS")]
    pub max_chars: Option<usize>,

    /// Pairs per forward pass
    #[arg(long, env = "BATCH_SIZE", default_value_t = 16)]
    pub batch_size: usize,

    /// Compute workers, each holding its own model copy
    #[arg(long, env = "WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Batches that may wait for a free worker
    #[arg(long, env = "QUEUE_DEPTH", default_value_t = 64)]
    pub queue_depth: usize,

    /// Seconds a request waits for any one batch before giving up
    #[arg(long, env = "BATCH_TIMEOUT_SECS", default_value_t = 120)]
    pub batch_timeout_secs: u64,

    /// ONNX Runtime intra-op threads per worker [default: runtime decides]
    #[arg(long, env = "INTRA_THREADS")]
    pub intra_threads: Option<usize>,

    /// Class order of the model head, e.g. contradiction,neutral,entailment
    #[arg(long, env = "LABEL_ORDER")]
    pub label_order: Option<LabelMap>,

    /// Local checkpoint cache
    #[arg(long, env = "MODELS_DIR", default_value = "models")]
    pub models_dir: PathBuf,

    /// Model hub to download checkpoints from
    #[arg(long, env = "HF_ENDPOINT", default_value = "https://huggingface.co")]
    pub hub_url: String,

    /// Hub revision (branch, tag or commit)
    #[arg(long, env = "MODEL_REVISION", default_value = "main")]
    pub revision: String,

    /// Never download; use only local checkpoints
    #[arg(long, env = "NLI_OFFLINE", value_parser = BoolishValueParser::new())]
    pub offline: bool,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
}

impl Config {
    /// Reject values clap accepts but the service cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_length > 0, "MAX_LENGTH must be at least 1");
        anyhow::ensure!(self.max_chars() > 0, "MAX_CHARS must be at least 1");
        anyhow::ensure!(self.batch_size > 0, "BATCH_SIZE must be at least 1");
        anyhow::ensure!(self.workers > 0, "WORKERS must be at least 1");
        anyhow::ensure!(self.queue_depth > 0, "QUEUE_DEPTH must be at least 1");
        anyhow::ensure!(
            self.batch_timeout_secs > 0,
            "BATCH_TIMEOUT_SECS must be at least 1"
        );
        anyhow::ensure!(
            self.intra_threads != Some(0),
            "INTRA_THREADS must be at least 1"
        );
        anyhow::ensure!(!self.model.trim().is_empty(), "NLI_MODEL must not be empty");
        Ok(())
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(self.max_length)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Hub client for downloads, or `None` when running offline.
    pub fn hub(&self) -> Option<HubClient> {
        (!self.offline).then(|| HubClient::new(self.hub_url.clone(), self.revision.clone()))
    }
}
