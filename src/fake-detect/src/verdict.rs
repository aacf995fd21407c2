//! Reduces classifier label/score pairs to a real-vs-fake verdict.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::Serialize;

use crate::classification::{check_score, ClassificationEntry, ClassificationResult};
use crate::error::{Error, Result};

/// Substrings that mark a label as the fake side unless configured otherwise.
pub const DEFAULT_FAKE_KEYWORDS: &[&str] = &["fake", "artificial", "ai", "generated"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Prediction {
    Real,
    Fake,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Probabilities {
    pub real: f64,
    pub fake: f64,
}

/// Verdict for a single image. Probabilities are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    pub prediction: Prediction,
    pub confidence: f64,
    pub probabilities: Probabilities,
}

impl Verdict {
    pub fn unknown() -> Self {
        Verdict {
            prediction: Prediction::Unknown,
            confidence: 0.0,
            probabilities: Probabilities {
                real: 0.0,
                fake: 0.0,
            },
        }
    }
}

/// Case-insensitive label keywords identifying the fake side.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    /// Build from arbitrary keywords. Blank entries are dropped.
    pub fn new<I, S>(keywords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Err(Error::Configuration(
                "fake keyword set must not be empty".to_string(),
            ));
        }

        Ok(KeywordSet { keywords })
    }

    pub fn is_fake(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.keywords.iter().any(|k| label.contains(k.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        KeywordSet {
            keywords: DEFAULT_FAKE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Which two entries of a result are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The two highest scores; classifier order breaks ties.
    TopScores,
    /// The first two entries as the classifier returned them.
    Leading,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::TopScores
    }
}

impl FromStr for Selection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "top" | "top-scores" => Ok(Selection::TopScores),
            "leading" | "first" => Ok(Selection::Leading),
            other => Err(Error::Configuration(format!(
                "unknown selection '{}', expected 'top' or 'leading'",
                other
            ))),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::TopScores => write!(f, "top"),
            Selection::Leading => write!(f, "leading"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    keywords: KeywordSet,
    selection: Selection,
    strict: bool,
}

impl Normalizer {
    pub fn new(keywords: KeywordSet, selection: Selection) -> Self {
        Normalizer {
            keywords,
            selection,
            strict: false,
        }
    }

    /// Fail with `InsufficientResults` instead of returning an UNKNOWN verdict.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    pub fn normalize(&self, result: &ClassificationResult) -> Result<Verdict> {
        let entries = result.entries();

        if entries.len() < 2 {
            if self.strict {
                return Err(Error::InsufficientResults {
                    count: entries.len(),
                });
            }
            debug!("{} result(s), returning unknown verdict", entries.len());
            return Ok(Verdict::unknown());
        }

        for (i, entry) in entries.iter().enumerate() {
            check_score(i, entry.score)?;
        }

        let (first, second) = self.pick(entries);

        let sides = (
            self.keywords.is_fake(&first.label),
            self.keywords.is_fake(&second.label),
        );
        let (fake, real) = match sides {
            (true, false) => (first, second),
            (false, true) => (second, first),
            (both_fake, _) => {
                let side = if both_fake { "fake" } else { "real" };
                return Err(Error::malformed(
                    None,
                    format!(
                        "labels '{}' and '{}' both classify as {}",
                        first.label, second.label, side
                    ),
                ));
            }
        };

        let fake_pct = fake.score * 100.0;
        let real_pct = real.score * 100.0;

        let prediction = if fake_pct > real_pct {
            Prediction::Fake
        } else {
            Prediction::Real
        };

        Ok(Verdict {
            prediction,
            confidence: round2(fake_pct.max(real_pct)),
            probabilities: Probabilities {
                real: round2(real_pct),
                fake: round2(fake_pct),
            },
        })
    }

    fn pick<'a>(
        &self,
        entries: &'a [ClassificationEntry],
    ) -> (&'a ClassificationEntry, &'a ClassificationEntry) {
        match self.selection {
            Selection::Leading => (&entries[0], &entries[1]),
            Selection::TopScores => {
                let mut ranked: Vec<&ClassificationEntry> = entries.iter().collect();
                // stable, so equal scores keep classifier order
                ranked.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                (ranked[0], ranked[1])
            }
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
