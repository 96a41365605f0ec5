//! JSON bodies exchanged over the HTTP API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pair::{ClassificationResult, Pair};

/// Body of `POST /nli`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NliRequest {
    pub pairs: Vec<Pair>,
    /// Reserved for multi-model routing. Accepted and ignored.
    #[serde(default)]
    pub model: Option<String>,
}

/// Response of `POST /nli`, one result per input pair in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NliResponse {
    pub results: Vec<ClassificationResult>,
}

/// Response of `GET /health` while the model is loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
}

/// Static response of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub model: String,
    pub device: String,
    pub endpoints: BTreeMap<String, String>,
}

/// Error body for every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_model_defaults_to_none() {
        let json = r#"{"pairs": [{"premise": "A man sleeps.", "hypothesis": "A man is awake."}]}"#;
        let req: NliRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.pairs.len(), 1);
        assert!(req.model.is_none());
    }

    #[test]
    fn request_accepts_null_model() {
        let json = r#"{"pairs": [], "model": null}"#;
        let req: NliRequest = serde_json::from_str(json).unwrap();
        assert!(req.pairs.is_empty());
        assert!(req.model.is_none());
    }

    #[test]
    fn request_requires_pairs() {
        assert!(serde_json::from_str::<NliRequest>(r#"{"model": "x"}"#).is_err());
    }

    #[test]
    fn response_scores_parse_back_into_labels() {
        let json = r#"{"results": [{
            "label": "neutral",
            "confidence": 0.6,
            "scores": {"entailment": 0.3, "neutral": 0.6, "contradiction": 0.1}
        }]}"#;
        let resp: NliResponse = serde_json::from_str(json).unwrap();
        let result = &resp.results[0];
        assert_eq!(result.label, crate::Label::Neutral);
        assert_eq!(result.scores.len(), 3);
    }
}
