//! Premise/hypothesis pairs and their per-pair classification results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::labels::{Label, LabelMap, NUM_CLASSES};

/// A premise and a hypothesis to classify against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    pub premise: String,
    pub hypothesis: String,
}

impl Pair {
    pub fn new(premise: impl Into<String>, hypothesis: impl Into<String>) -> Self {
        Self {
            premise: premise.into(),
            hypothesis: hypothesis.into(),
        }
    }

    /// Both fields cut to at most `max_chars` characters.
    pub fn truncated(&self, max_chars: usize) -> (&str, &str) {
        (
            truncate_chars(&self.premise, max_chars),
            truncate_chars(&self.hypothesis, max_chars),
        )
    }
}

/// Prefix of `text` holding at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Best label, its probability, and the full distribution for one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    pub confidence: f32,
    pub scores: BTreeMap<Label, f32>,
}

impl ClassificationResult {
    /// Build a result from one softmax row in model class order.
    ///
    /// Ties go to the lowest class index.
    pub fn from_probabilities(probs: &[f32; NUM_CLASSES], labels: &LabelMap) -> Self {
        let mut best = 0;
        for (class, &p) in probs.iter().enumerate().skip(1) {
            if p > probs[best] {
                best = class;
            }
        }

        let scores = labels
            .labels()
            .iter()
            .zip(probs)
            .map(|(&label, &p)| (label, p))
            .collect();

        Self {
            label: labels.labels()[best],
            confidence: probs[best],
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("短い文", 2), "短い");
    }

    #[test]
    fn truncate_leaves_short_text_alone() {
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn truncate_to_zero_is_empty() {
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn pair_truncates_both_fields() {
        let pair = Pair::new("a".repeat(300), "b".repeat(10));
        let (p, h) = pair.truncated(256);
        assert_eq!(p.len(), 256);
        assert_eq!(h.len(), 10);
    }

    #[test]
    fn result_maps_classes_through_label_map() {
        let probs = [0.7, 0.2, 0.1];
        let result = ClassificationResult::from_probabilities(&probs, &LabelMap::CONTRADICTION_FIRST);
        assert_eq!(result.label, Label::Contradiction);
        assert_eq!(result.confidence, 0.7);
        assert_eq!(result.scores[&Label::Entailment], 0.1);
        assert_eq!(result.scores[&Label::Neutral], 0.2);
        assert_eq!(result.scores.len(), 3);
    }

    #[test]
    fn result_ties_pick_lowest_class() {
        let probs = [0.4, 0.4, 0.2];
        let result = ClassificationResult::from_probabilities(&probs, &LabelMap::ENTAILMENT_FIRST);
        assert_eq!(result.label, Label::Entailment);
    }

    #[test]
    fn result_json_shape() {
        let result =
            ClassificationResult::from_probabilities(&[0.5, 0.25, 0.25], &LabelMap::ENTAILMENT_FIRST);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["label"], "entailment");
        assert_eq!(value["confidence"], 0.5);
        assert_eq!(value["scores"]["neutral"], 0.25);
        assert_eq!(value["scores"]["contradiction"], 0.25);
    }

    #[test]
    fn pair_rejects_missing_hypothesis() {
        let err = serde_json::from_str::<Pair>(r#"{"premise": "p"}"#);
        assert!(err.is_err());
    }
}
