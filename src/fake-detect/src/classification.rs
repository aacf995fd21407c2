use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// One label/score pair reported by a classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationEntry {
    /// Free-text category, e.g. "artificial" or "real"
    pub label: String,

    /// Classifier score in [0, 1]
    pub score: f64,
}

impl ClassificationEntry {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        ClassificationEntry {
            label: label.into(),
            score,
        }
    }
}

/// Classifier output for a single image, in classifier order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClassificationResult {
    entries: Vec<ClassificationEntry>,
}

impl ClassificationResult {
    pub fn new(entries: Vec<ClassificationEntry>) -> Self {
        ClassificationResult { entries }
    }

    /// Validate raw classifier JSON.
    ///
    /// Accepts `[{"label": .., "score": ..}, ..]` and the singly nested
    /// `[[..]]` form. Every entry needs a string `label` and a finite numeric
    /// `score` within [0, 1].
    pub fn from_json(value: &Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => match items.as_slice() {
                [Value::Array(inner)] => inner,
                _ => items,
            },
            Value::Object(map) if map.contains_key("error") => {
                return Err(Error::malformed(
                    None,
                    format!("classifier reported an error: {}", map["error"]),
                ))
            }
            other => {
                return Err(Error::malformed(
                    None,
                    format!("expected an array, got {}", json_kind(other)),
                ))
            }
        };

        let entries = items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_entry(i, item))
            .collect::<Result<Vec<_>>>()?;

        Ok(ClassificationResult { entries })
    }

    /// Pair raw model outputs with their labels, highest score first.
    ///
    /// With `softmax` the outputs are treated as logits. Otherwise they must
    /// already be probabilities in [0, 1].
    pub fn from_label_scores(labels: &[String], scores: &[f32], softmax: bool) -> Result<Self> {
        if scores.len() != labels.len() {
            return Err(Error::Model(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                labels.len()
            )));
        }

        let mut scores: Vec<f64> = scores.iter().map(|s| f64::from(*s)).collect();
        if softmax {
            apply_softmax(&mut scores);
        }

        let mut entries = labels
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(i, (label, score))| {
                check_score(i, score)?;
                Ok(ClassificationEntry::new(label.clone(), score))
            })
            .collect::<Result<Vec<_>>>()?;

        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(ClassificationResult { entries })
    }

    pub fn entries(&self) -> &[ClassificationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<ClassificationEntry>> for ClassificationResult {
    fn from(entries: Vec<ClassificationEntry>) -> Self {
        ClassificationResult::new(entries)
    }
}

fn parse_entry(index: usize, item: &Value) -> Result<ClassificationEntry> {
    let obj = item.as_object().ok_or_else(|| {
        Error::malformed(
            Some(index),
            format!("expected an object, got {}", json_kind(item)),
        )
    })?;

    let label = match obj.get("label") {
        Some(Value::String(label)) => label.clone(),
        Some(other) => {
            return Err(Error::malformed(
                Some(index),
                format!("`label` must be a string, got {}", json_kind(other)),
            ))
        }
        None => return Err(Error::malformed(Some(index), "missing `label`")),
    };

    let score = match obj.get("score") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::malformed(Some(index), "`score` is not representable"))?,
        Some(other) => {
            return Err(Error::malformed(
                Some(index),
                format!("`score` must be a number, got {}", json_kind(other)),
            ))
        }
        None => return Err(Error::malformed(Some(index), "missing `score`")),
    };

    check_score(index, score)?;

    Ok(ClassificationEntry { label, score })
}

/// Scores must be finite probabilities.
pub(crate) fn check_score(index: usize, score: f64) -> Result<()> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(Error::malformed(
            Some(index),
            format!("`score` {} is outside [0, 1]", score),
        ));
    }
    Ok(())
}

fn apply_softmax(scores: &mut [f64]) {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
