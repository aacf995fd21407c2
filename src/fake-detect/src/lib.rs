//! Real-vs-fake image verdicts on top of an external image classifier.
//!
//! A [`Classifier`] turns image bytes into label/score pairs, either through
//! the Hugging Face Inference API or a local TensorFlow SavedModel. The
//! [`Normalizer`] reduces those pairs to a [`Verdict`].

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

pub mod classification;
pub mod classifier;
pub mod config;
pub mod error;
pub mod payload;
pub mod remote;
pub mod verdict;

#[cfg(feature = "tensorflow")]
pub mod local;

pub use classification::{ClassificationEntry, ClassificationResult};
pub use classifier::{Backend, Classifier};
pub use config::{ClassifierOpts, NormalizerOpts};
pub use error::{Error, Result};
pub use remote::HuggingFaceClassifier;
pub use verdict::{KeywordSet, Normalizer, Prediction, Probabilities, Selection, Verdict};

#[cfg(feature = "tensorflow")]
pub use local::TensorFlowClassifier;

/// Logs how long a named phase took.
pub struct Timer {
    name: String,
    tstamp: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: &str) -> Self {
        Timer {
            name: name.to_owned(),
            tstamp: None,
            duration: None,
        }
    }

    pub fn new_start(name: &str) -> Self {
        let mut t = Timer::new(name);
        t.start();
        t
    }

    /// Start the timer
    pub fn start(&mut self) {
        info!("{}: starting", self.name);

        self.tstamp = Some(Utc::now());
        self.duration = None;
    }

    /// Stop the timer
    pub fn stop(&mut self) {
        match self.tstamp {
            None => debug!("{}: not running!", self.name),
            Some(tstamp) => {
                let d = Utc::now() - tstamp;

                self.duration = Some(d);
                self.tstamp = None;
                info!("{} duration: {} msec", self.name, d.num_milliseconds());
            }
        }
    }

    /// Duration of the last completed run in milliseconds
    pub fn elapsed_ms(&self) -> i64 {
        match self.duration {
            None => 0,
            Some(dur) => dur.num_milliseconds(),
        }
    }
}
