//! Hugging Face Inference API backend.
//!
//! Posts the raw image bytes to `{base_url}/models/{model}` and validates the
//! returned `[{"label", "score"}, ..]` array.
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::classification::ClassificationResult;
use crate::classifier::{Backend, Classifier};
use crate::error::{Error, Result};
use crate::payload::sniff_format;
use crate::Timer;

/// Default base URL for the Hugging Face Inference API
pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct HuggingFaceClassifier {
    http: Client,
    base_url: String,
    model: String,
    token: Option<String>,
}

impl HuggingFaceClassifier {
    pub fn new(model: impl Into<String>, token: Option<String>) -> Result<Self> {
        Self::with_base_url(model, token, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a classifier against a custom endpoint (for testing with wiremock).
    pub fn with_base_url(
        model: impl Into<String>,
        token: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        let base_url: String = base_url.into();

        Ok(HuggingFaceClassifier {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }

    /// Map a non-success status to an error class.
    fn status_error(&self, status: StatusCode, body: &str) -> Error {
        let detail: Option<Value> = serde_json::from_str(body).ok();
        let message = detail
            .as_ref()
            .and_then(|d| d.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string());

        match status.as_u16() {
            401 | 403 => Error::AuthenticationFailed,
            404 => Error::ModelNotFound(self.model.clone()),
            429 => Error::RateLimited,
            503 => Error::ModelLoading {
                estimated_time: detail
                    .as_ref()
                    .and_then(|d| d.get("estimated_time"))
                    .and_then(Value::as_f64),
            },
            code => Error::Api {
                status: code,
                message,
            },
        }
    }
}

#[async_trait]
impl Classifier for HuggingFaceClassifier {
    fn name(&self) -> &str {
        &self.model
    }

    fn backend(&self) -> Backend {
        Backend::Remote
    }

    async fn classify(&self, image: &[u8]) -> Result<ClassificationResult> {
        let format = sniff_format(image)?;
        debug!(
            "Forwarding {:?} image ({} bytes) to {}",
            format,
            image.len(),
            self.endpoint()
        );

        let mut t = Timer::new_start("Remote inference");

        let mut request = self
            .http
            .post(&self.endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        t.stop();

        if !status.is_success() {
            let err = self.status_error(status, &body);
            warn!("Inference API answered {}: {}", status, err);
            return Err(err);
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::malformed(None, format!("response is not JSON: {}", e)))?;

        ClassificationResult::from_json(&value)
    }
}
