//! Error taxonomy shared by the library and both front-ends.

/// Everything that can go wrong between receiving an image and producing a verdict.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Normalizer errors
    #[error("classifier returned {count} result(s), at least 2 are required")]
    InsufficientResults { count: usize },

    #[error("malformed classification result{}: {reason}", index_suffix(.index))]
    MalformedClassificationResult {
        index: Option<usize>,
        reason: String,
    },

    // Input errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    // Upstream classifier errors
    #[error("could not reach classifier: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("classifier rejected credentials")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model is loading{}", eta_suffix(.estimated_time))]
    ModelLoading { estimated_time: Option<f64> },

    #[error("classifier rate limited the request")]
    RateLimited,

    // Local model errors
    #[error("model error: {0}")]
    Model(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Stable machine-readable identifier for the error class.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InsufficientResults { .. } => "insufficient_results",
            Error::MalformedClassificationResult { .. } => "malformed_classification_result",
            Error::InvalidInput(_) => "invalid_input",
            Error::Base64(_) => "invalid_base64",
            Error::UnsupportedImage(_) => "unsupported_image",
            Error::UnsupportedMediaType(_) => "unsupported_media_type",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::Http(_) => "upstream_unreachable",
            Error::Api { .. } => "upstream_error",
            Error::AuthenticationFailed => "upstream_auth_failed",
            Error::ModelNotFound(_) => "model_not_found",
            Error::ModelLoading { .. } => "model_loading",
            Error::RateLimited => "upstream_rate_limited",
            Error::Model(_) => "model_error",
            Error::Configuration(_) => "configuration",
        }
    }

    pub(crate) fn malformed(index: Option<usize>, reason: impl Into<String>) -> Self {
        Error::MalformedClassificationResult {
            index,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "tensorflow")]
impl From<tensorflow::Status> for Error {
    fn from(status: tensorflow::Status) -> Self {
        Error::Model(status.to_string())
    }
}

fn index_suffix(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at entry {}", i),
        None => String::new(),
    }
}

fn eta_suffix(estimated_time: &Option<f64>) -> String {
    match estimated_time {
        Some(secs) => format!(", ready in about {:.0}s", secs),
        None => String::new(),
    }
}

/// Result type alias for fake-detect operations
pub type Result<T> = std::result::Result<T, Error>;
