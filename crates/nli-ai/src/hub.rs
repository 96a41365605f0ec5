//! Checkpoint resolution: explicit path, local model cache, or hub download.

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::checkpoint::{CONFIG_FILE, CheckpointFiles, MODEL_FILE, TOKENIZER_FILE};

/// Remote locations tried, in order, for the ONNX graph.
const MODEL_CANDIDATES: &[&str] = &["onnx/model.onnx", "model.onnx"];

#[derive(Error, Debug)]
pub enum HubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub returned {status} for {url}: {body}")]
    Server {
        url: String,
        status: u16,
        body: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file} not found on the hub for model {model_id:?}")]
    NotFound { model_id: String, file: &'static str },
    #[error("model {0:?} is not in the local cache and downloads are disabled")]
    Offline(String),
    #[error("{} is not a complete checkpoint (needs model.onnx and tokenizer.json)", .0.display())]
    Incomplete(PathBuf),
}

/// HTTP client for a Hugging Face compatible model hub.
pub struct HubClient {
    client: reqwest::Client,
    base_url: String,
    revision: String,
}

impl HubClient {
    /// `base_url` should be like `https://huggingface.co` (no trailing slash).
    pub fn new(base_url: String, revision: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            revision,
        }
    }

    pub fn file_url(&self, model_id: &str, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.base_url, model_id, self.revision, file
        )
    }

    /// Download every checkpoint file for `model_id` into `dest`.
    ///
    /// `config.json` is optional; the ONNX graph and tokenizer are not.
    pub async fn download(&self, model_id: &str, dest: &Path) -> Result<CheckpointFiles, HubError> {
        tokio::fs::create_dir_all(dest).await?;

        let mut found_model = false;
        for remote in MODEL_CANDIDATES {
            if self.fetch(model_id, remote, &dest.join(MODEL_FILE)).await? {
                found_model = true;
                break;
            }
        }
        if !found_model {
            return Err(HubError::NotFound {
                model_id: model_id.to_string(),
                file: MODEL_FILE,
            });
        }

        if !self
            .fetch(model_id, TOKENIZER_FILE, &dest.join(TOKENIZER_FILE))
            .await?
        {
            return Err(HubError::NotFound {
                model_id: model_id.to_string(),
                file: TOKENIZER_FILE,
            });
        }

        if !self
            .fetch(model_id, CONFIG_FILE, &dest.join(CONFIG_FILE))
            .await?
        {
            debug!(model = model_id, "checkpoint has no config.json");
        }

        CheckpointFiles::from_dir(dest).ok_or_else(|| HubError::Incomplete(dest.to_path_buf()))
    }

    /// Stream one remote file to `dest`. Returns `false` if the hub has no such file.
    ///
    /// Writes go to a `.part` sibling first so an interrupted download never
    /// looks like a complete checkpoint.
    async fn fetch(&self, model_id: &str, file: &str, dest: &Path) -> Result<bool, HubError> {
        let url = self.file_url(model_id, file);
        debug!(url = %url, "fetching checkpoint file");

        let mut resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::Server {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let partial = dest.with_extension("part");
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&partial, dest).await?;

        info!(file, bytes, "downloaded checkpoint file");
        Ok(true)
    }
}

/// Turns a model identifier into checkpoint files on local disk.
pub struct CheckpointResolver {
    models_dir: PathBuf,
    hub: Option<HubClient>,
}

impl CheckpointResolver {
    /// `hub: None` means offline: only local paths and the cache are consulted.
    pub fn new(models_dir: PathBuf, hub: Option<HubClient>) -> Self {
        Self { models_dir, hub }
    }

    /// Cache location for a hub id; `org/name` becomes a nested directory.
    pub fn cache_dir(&self, model_id: &str) -> PathBuf {
        self.models_dir.join(model_id)
    }

    /// Resolve `model_id`, checking in order: an existing directory of that
    /// name, the model cache, then the hub.
    pub async fn resolve(&self, model_id: &str) -> Result<CheckpointFiles, HubError> {
        let direct = Path::new(model_id);
        if direct.is_dir() {
            let files = CheckpointFiles::from_dir(direct)
                .ok_or_else(|| HubError::Incomplete(direct.to_path_buf()))?;
            info!(dir = %files.dir.display(), "using checkpoint directory");
            return Ok(files);
        }

        let cached = self.cache_dir(model_id);
        if let Some(files) = CheckpointFiles::from_dir(&cached) {
            info!(dir = %files.dir.display(), "using cached checkpoint");
            return Ok(files);
        }

        let Some(hub) = &self.hub else {
            return Err(HubError::Offline(model_id.to_string()));
        };

        info!(model = model_id, dest = %cached.display(), "downloading checkpoint");
        hub.download(model_id, &cached).await
    }
}
