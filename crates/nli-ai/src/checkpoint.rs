//! On-disk layout of an exported NLI checkpoint.
//!
//! A checkpoint directory must contain `model.onnx` and `tokenizer.json`.
//! `config.json` is optional and supplies `id2label` and `pad_token_id`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";

/// Paths to the files of a resolved checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointFiles {
    pub dir: PathBuf,
    pub model: PathBuf,
    pub tokenizer: PathBuf,
    pub config: Option<PathBuf>,
}

impl CheckpointFiles {
    /// Collect checkpoint files from `dir`, or `None` if the required ones are missing.
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let model = dir.join(MODEL_FILE);
        let tokenizer = dir.join(TOKENIZER_FILE);
        if !model.is_file() || !tokenizer.is_file() {
            return None;
        }
        let config = Some(dir.join(CONFIG_FILE)).filter(|p| p.is_file());
        Some(Self {
            dir: dir.to_path_buf(),
            model,
            tokenizer,
            config,
        })
    }
}

/// The subset of a Hugging Face `config.json` the service reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub id2label: Option<HashMap<String, String>>,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
}

impl ModelConfig {
    /// Parse `config.json`, or return an empty config when there is none.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Class count declared by `id2label`, if any.
    pub fn num_labels(&self) -> Option<usize> {
        self.id2label.as_ref().map(HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_dir_requires_model_and_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointFiles::from_dir(dir.path()).is_none());

        std::fs::write(dir.path().join(MODEL_FILE), b"onnx").unwrap();
        assert!(CheckpointFiles::from_dir(dir.path()).is_none());

        std::fs::write(dir.path().join(TOKENIZER_FILE), b"{}").unwrap();
        let files = CheckpointFiles::from_dir(dir.path()).unwrap();
        assert!(files.config.is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), b"{}").unwrap();
        let files = CheckpointFiles::from_dir(dir.path()).unwrap();
        assert_eq!(files.config, Some(dir.path().join(CONFIG_FILE)));
    }

    #[test]
    fn config_reads_id2label_and_pad_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "model_type": "deberta-v2",
                "id2label": {"0": "CONTRADICTION", "1": "NEUTRAL", "2": "ENTAILMENT"},
                "pad_token_id": 0,
                "hidden_size": 1024
            }"#,
        )
        .unwrap();

        let config = ModelConfig::load(Some(&path)).unwrap();
        assert_eq!(config.num_labels(), Some(3));
        assert_eq!(config.pad_token_id, Some(0));
        assert_eq!(config.id2label.unwrap()["0"], "CONTRADICTION");
    }

    #[test]
    fn missing_config_is_empty() {
        let config = ModelConfig::load(None).unwrap();
        assert!(config.id2label.is_none());
        assert!(config.pad_token_id.is_none());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "not json").unwrap();
        assert!(ModelConfig::load(Some(&path)).is_err());
    }
}
