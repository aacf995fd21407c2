//! Command-line options shared by the server and the CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use structopt::StructOpt;

use crate::classifier::{Backend, Classifier};
use crate::error::{Error, Result};
use crate::remote::HuggingFaceClassifier;
use crate::verdict::{KeywordSet, Normalizer, Selection};

#[derive(StructOpt, Debug, Clone)]
pub struct ClassifierOpts {
    #[structopt(
        long,
        env = "FAKE_DETECT_BACKEND",
        default_value = "remote",
        help = "Classifier backend: 'remote' (Hugging Face Inference API) or 'local' (TensorFlow SavedModel)"
    )]
    pub backend: Backend,

    #[structopt(
        long,
        env = "HF_MODEL",
        default_value = "haywoodsloan/ai-image-detector-deploy",
        help = "Model id on the inference API"
    )]
    pub model: String,

    #[structopt(long, env = "HF_TOKEN", hide_env_values = true, help = "Inference API token")]
    pub hf_token: Option<String>,

    #[structopt(
        long,
        env = "HF_BASE_URL",
        default_value = "https://api-inference.huggingface.co",
        help = "Inference API base URL"
    )]
    pub hf_base_url: String,

    #[structopt(long, default_value = "60", help = "Inference API request timeout in seconds")]
    pub timeout_secs: u64,

    #[structopt(
        long,
        env = "MODEL_DIR",
        parse(from_os_str),
        help = "Export directory of TensorFlow SavedModel"
    )]
    pub model_dir: Option<PathBuf>,

    #[structopt(
        long,
        env = "LABELS_PATH",
        parse(from_os_str),
        help = "Labels file, one class per line in output order"
    )]
    pub labels_path: Option<PathBuf>,

    #[structopt(long, default_value = "224", help = "Square input size of the local model")]
    pub input_size: u32,

    #[structopt(long, help = "Apply softmax to the local model's outputs (for models that emit logits)")]
    pub softmax: bool,
}

impl ClassifierOpts {
    /// Construct the configured classifier.
    pub fn build(&self) -> Result<Arc<dyn Classifier>> {
        match self.backend {
            Backend::Remote => {
                if self.hf_token.is_none() {
                    warn!("HF_TOKEN is not set, inference API requests are anonymous");
                }

                let classifier = HuggingFaceClassifier::with_base_url(
                    self.model.clone(),
                    self.hf_token.clone(),
                    self.hf_base_url.clone(),
                    Duration::from_secs(self.timeout_secs),
                )?;
                info!("Using inference API endpoint {}", classifier.endpoint());

                Ok(Arc::new(classifier))
            }
            Backend::Local => self.build_local(),
        }
    }

    #[cfg(feature = "tensorflow")]
    fn build_local(&self) -> Result<Arc<dyn Classifier>> {
        let export_dir = self
            .model_dir
            .as_ref()
            .ok_or_else(|| Error::Configuration("local backend needs --model-dir".to_string()))?;

        let labels_path = match &self.labels_path {
            Some(path) => path.clone(),
            None => export_dir.join("labels.txt"),
        };

        let classifier = crate::local::TensorFlowClassifier::new(
            export_dir,
            &labels_path,
            self.input_size,
            self.softmax,
        )?;
        info!("Loaded local model from {}", export_dir.display());

        Ok(Arc::new(classifier))
    }

    #[cfg(not(feature = "tensorflow"))]
    fn build_local(&self) -> Result<Arc<dyn Classifier>> {
        Err(Error::Configuration(
            "local backend requires building with the `tensorflow` feature".to_string(),
        ))
    }
}

#[derive(StructOpt, Debug, Clone)]
pub struct NormalizerOpts {
    #[structopt(
        long,
        env = "FAKE_KEYWORDS",
        use_delimiter = true,
        help = "Comma separated label substrings that mean 'fake' [default: fake,artificial,ai,generated]. Matching is by substring, so 'ai' also matches labels like 'portrait'"
    )]
    pub fake_keywords: Vec<String>,

    #[structopt(
        long,
        default_value = "top",
        help = "Entries to compare: 'top' (two highest scores) or 'leading' (first two)"
    )]
    pub selection: Selection,

    #[structopt(
        long,
        help = "Answer UNKNOWN instead of failing when the classifier returns fewer than 2 results"
    )]
    pub allow_unknown: bool,
}

impl NormalizerOpts {
    pub fn build(&self) -> Result<Normalizer> {
        let keywords = if self.fake_keywords.is_empty() {
            KeywordSet::default()
        } else {
            KeywordSet::new(&self.fake_keywords)?
        };

        Ok(Normalizer::new(keywords, self.selection).strict(!self.allow_unknown))
    }
}
