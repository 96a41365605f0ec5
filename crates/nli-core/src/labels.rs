//! Canonical NLI labels and per-checkpoint class orderings.
//!
//! Checkpoints fine-tuned on MNLI-style data all predict the same three
//! classes but disagree on the order of their output logits. A [`LabelMap`]
//! pins down that order for the active model. It is resolved once at startup
//! from, in order of precedence, an explicit override, the model's own
//! `id2label` config, or the [`CHECKPOINT_FAMILIES`] table.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of output classes every supported NLI head must produce.
pub const NUM_CLASSES: usize = 3;

/// One of the three canonical NLI relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Entailment,
    Neutral,
    Contradiction,
}

impl Label {
    pub const ALL: [Label; NUM_CLASSES] = [Label::Entailment, Label::Neutral, Label::Contradiction];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entailment => "entailment",
            Self::Neutral => "neutral",
            Self::Contradiction => "contradiction",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LabelError::Unknown(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("unknown NLI label {0:?}")]
    Unknown(String),

    #[error("label order must name entailment, neutral and contradiction exactly once, got {0:?}")]
    NotAPermutation(String),

    #[error("expected a 3-class NLI head, model has {found} classes")]
    ClassCount { found: usize },

    #[error("id2label has invalid class index {0:?}")]
    BadClassIndex(String),

    #[error(
        "no label ordering known for model {model:?}: config has no usable id2label \
         and no checkpoint family matched (set LABEL_ORDER to choose one)"
    )]
    Unmapped { model: String },
}

/// Mapping from model output class index to canonical [`Label`].
///
/// Always a permutation of [`Label::ALL`], so every distribution built from
/// it covers exactly the three canonical labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelMap([Label; NUM_CLASSES]);

/// Where a [`LabelMap`] came from. Logged at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    Override,
    ModelConfig,
    Family(&'static str),
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => f.write_str("override"),
            Self::ModelConfig => f.write_str("id2label"),
            Self::Family(family) => write!(f, "family:{family}"),
        }
    }
}

impl LabelMap {
    /// `[entailment, neutral, contradiction]`: the generic MNLI ordering.
    pub const ENTAILMENT_FIRST: LabelMap =
        LabelMap([Label::Entailment, Label::Neutral, Label::Contradiction]);

    /// `[contradiction, neutral, entailment]`: DeBERTa MNLI checkpoints.
    pub const CONTRADICTION_FIRST: LabelMap =
        LabelMap([Label::Contradiction, Label::Neutral, Label::Entailment]);

    /// Build a map from an explicit class order.
    pub fn new(order: [Label; NUM_CLASSES]) -> Result<Self, LabelError> {
        let is_permutation = Label::ALL.iter().all(|label| order.contains(label));
        if !is_permutation {
            let names: Vec<&str> = order.iter().map(Label::as_str).collect();
            return Err(LabelError::NotAPermutation(names.join(",")));
        }
        Ok(Self(order))
    }

    /// Label for output class `class`, or `None` if out of range.
    pub fn label(&self, class: usize) -> Option<Label> {
        self.0.get(class).copied()
    }

    /// Labels in class-index order.
    pub fn labels(&self) -> &[Label; NUM_CLASSES] {
        &self.0
    }

    /// Read a map from a model's `id2label` config.
    ///
    /// Returns `Ok(None)` when the names are generic (`LABEL_0`, ...) and say
    /// nothing about NLI semantics. A head with the wrong number of classes or
    /// a malformed index is an error.
    pub fn from_id2label(id2label: &HashMap<String, String>) -> Result<Option<Self>, LabelError> {
        if id2label.len() != NUM_CLASSES {
            return Err(LabelError::ClassCount {
                found: id2label.len(),
            });
        }

        let mut order: [Option<Label>; NUM_CLASSES] = [None; NUM_CLASSES];
        for (index, name) in id2label {
            let class = index
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&i| i < NUM_CLASSES)
                .ok_or_else(|| LabelError::BadClassIndex(index.clone()))?;
            match name.parse::<Label>() {
                Ok(label) => order[class] = Some(label),
                Err(_) => return Ok(None),
            }
        }

        let [Some(a), Some(b), Some(c)] = order else {
            return Ok(None);
        };
        Self::new([a, b, c]).map(Some)
    }

    /// Pick the map for the active model.
    ///
    /// Precedence: `explicit` override, then the model's `id2label`, then the
    /// first [`CHECKPOINT_FAMILIES`] entry whose key occurs in `model_id`.
    /// Fails loudly when none applies.
    pub fn resolve(
        model_id: &str,
        id2label: Option<&HashMap<String, String>>,
        explicit: Option<LabelMap>,
    ) -> Result<(Self, LabelSource), LabelError> {
        if let Some(map) = explicit {
            return Ok((map, LabelSource::Override));
        }

        if let Some(id2label) = id2label
            && let Some(map) = Self::from_id2label(id2label)?
        {
            return Ok((map, LabelSource::ModelConfig));
        }

        let lowered = model_id.to_ascii_lowercase();
        CHECKPOINT_FAMILIES
            .iter()
            .find(|(family, _)| lowered.contains(family))
            .map(|&(family, map)| (map, LabelSource::Family(family)))
            .ok_or_else(|| LabelError::Unmapped {
                model: model_id.to_string(),
            })
    }
}

impl fmt::Display for LabelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{i}={label}")?;
        }
        Ok(())
    }
}

/// Parses a comma-separated class order such as `contradiction,neutral,entailment`.
impl FromStr for LabelMap {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let labels = s
            .split(',')
            .map(str::parse::<Label>)
            .collect::<Result<Vec<_>, _>>()?;
        let order: [Label; NUM_CLASSES] = labels
            .try_into()
            .map_err(|_| LabelError::NotAPermutation(s.to_string()))?;
        Self::new(order)
    }
}

/// Class orderings keyed by checkpoint family.
///
/// Matched as a case-insensitive substring of the model id; first match wins,
/// so more specific families go first. `nli` also covers `mnli`, `snli` and
/// `xnli` ids.
pub const CHECKPOINT_FAMILIES: &[(&str, LabelMap)] = &[
    ("deberta", LabelMap::CONTRADICTION_FIRST),
    ("nli", LabelMap::ENTAILMENT_FIRST),
];
