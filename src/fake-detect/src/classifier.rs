use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::classification::ClassificationResult;
use crate::error::{Error, Result};

/// Where classification runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Hosted inference endpoint
    Remote,
    /// Model loaded into this process
    Local,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "remote" | "huggingface" | "hf" => Ok(Backend::Remote),
            "local" | "tensorflow" | "tf" => Ok(Backend::Local),
            other => Err(Error::Configuration(format!(
                "unknown backend '{}', expected 'remote' or 'local'",
                other
            ))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Remote => write!(f, "remote"),
            Backend::Local => write!(f, "local"),
        }
    }
}

/// An image classifier producing label/score pairs.
///
/// Implementations are built once and shared by every request, so they must
/// not need mutable access after construction.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Model identifier reported to clients.
    fn name(&self) -> &str;

    fn backend(&self) -> Backend;

    /// Classify encoded image bytes (PNG, JPEG, ...).
    async fn classify(&self, image: &[u8]) -> Result<ClassificationResult>;
}
