//! Batch classification of premise/hypothesis pairs.
//!
//! [`BatchClassifier`] owns one model instance and turns a slice of pairs
//! into one [`ClassificationResult`] per pair: truncate, one forward pass for
//! the whole batch, softmax per row, map classes through the [`LabelMap`].

use nli_core::labels::NUM_CLASSES;
use nli_core::{ClassificationResult, LabelError, LabelMap, Pair};

/// A sequence-classification model over (premise, hypothesis) inputs.
///
/// Implementations tokenize the pairs jointly and run a single forward pass,
/// returning one row of raw logits per input, in input order.
pub trait NliModel: Send {
    /// Number of output classes of the classification head.
    fn num_classes(&self) -> usize;

    fn forward(&mut self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Runs batches of pairs through an [`NliModel`] and labels the output.
pub struct BatchClassifier<M> {
    model: M,
    labels: LabelMap,
    max_chars: usize,
}

impl<M: NliModel> BatchClassifier<M> {
    /// Wrap `model`; fails unless it has exactly three output classes.
    ///
    /// `max_chars` bounds each premise and hypothesis before tokenization.
    pub fn new(model: M, labels: LabelMap, max_chars: usize) -> anyhow::Result<Self> {
        let found = model.num_classes();
        if found != NUM_CLASSES {
            return Err(LabelError::ClassCount { found }.into());
        }
        Ok(Self {
            model,
            labels,
            max_chars,
        })
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Classify `pairs` in a single forward pass. Output order matches input order.
    pub fn classify(&mut self, pairs: &[Pair]) -> anyhow::Result<Vec<ClassificationResult>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }

        let inputs: Vec<(&str, &str)> = pairs.iter().map(|p| p.truncated(self.max_chars)).collect();
        let logits = self.model.forward(&inputs)?;
        anyhow::ensure!(
            logits.len() == pairs.len(),
            "model returned {} rows for a batch of {}",
            logits.len(),
            pairs.len()
        );

        logits
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let row: &[f32; NUM_CLASSES] = row.as_slice().try_into().map_err(|_| {
                    anyhow::anyhow!("row {i} has {} logits, expected {NUM_CLASSES}", row.len())
                })?;
                anyhow::ensure!(
                    row.iter().all(|x| x.is_finite()),
                    "row {i} has non-finite logits: {row:?}"
                );
                Ok(ClassificationResult::from_probabilities(
                    &softmax(row),
                    &self.labels,
                ))
            })
            .collect()
    }
}

/// Numerically stable softmax over one row of logits.
pub fn softmax<const N: usize>(logits: &[f32; N]) -> [f32; N] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut out = logits.map(|x| (x - max).exp());
    let sum: f32 = out.iter().sum();
    for p in &mut out {
        *p /= sum;
    }
    out
}
