//! Local TensorFlow SavedModel backend.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use log::debug;
use tensorflow::{Graph, SavedModelBundle, Session, SessionOptions, SessionRunArgs, Tensor};

use crate::classification::ClassificationResult;
use crate::classifier::{Backend, Classifier};
use crate::error::{Error, Result};
use crate::payload::load_image;
use crate::Timer;

/// Square input edge the model expects unless configured otherwise.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

const INPUT_OP: &str = "serving_default_input_1";
const OUTPUT_OP: &str = "StatefulPartitionedCall";

struct Model {
    /// TensorFlow model graph
    graph: Graph,

    /// TensorFlow session
    session: Session,

    /// One label per output index
    labels: Vec<String>,

    input_size: u32,

    /// Output tensor holds logits rather than probabilities
    softmax: bool,
}

#[derive(Clone)]
pub struct TensorFlowClassifier {
    name: String,
    model: Arc<Model>,
}

impl TensorFlowClassifier {
    pub fn new(
        export_dir: &Path,
        labels_path: &Path,
        input_size: u32,
        softmax: bool,
    ) -> Result<Self> {
        let mut t = Timer::new_start("Loading session");

        let mut graph = Graph::new();
        let session =
            SavedModelBundle::load(&SessionOptions::new(), &["serve"], &mut graph, export_dir)?
                .session;

        let labels: Vec<String> = std::fs::read_to_string(labels_path)
            .map_err(|e| {
                Error::Configuration(format!(
                    "could not read labels file {}: {}",
                    labels_path.display(),
                    e
                ))
            })?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if labels.len() < 2 {
            return Err(Error::Configuration(format!(
                "labels file {} must name at least 2 classes",
                labels_path.display()
            )));
        }

        t.stop();

        let name = export_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| export_dir.display().to_string());

        Ok(TensorFlowClassifier {
            name,
            model: Arc::new(Model {
                graph,
                session,
                labels,
                input_size,
                softmax,
            }),
        })
    }
}

impl Model {
    fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let mut t = Timer::new_start("Resizing image");

        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(
            &rgb,
            self.input_size,
            self.input_size,
            image::imageops::FilterType::Triangle,
        );

        let raw: Vec<f32> = resized
            .into_raw()
            .iter()
            .map(|x| *x as f32 / 255f32)
            .collect();

        t.stop();

        raw
    }

    fn run(&self, raw: &[f32]) -> Result<Vec<f32>> {
        let mut t = Timer::new_start("Running session");

        let size = u64::from(self.input_size);
        let input = Tensor::new(&[1, size, size, 3]).with_values(raw)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&self.graph.operation_by_name_required(INPUT_OP)?, 0, &input);
        let token = args.request_fetch(&self.graph.operation_by_name_required(OUTPUT_OP)?, 0);

        self.session.run(&mut args)?;
        let output: Tensor<f32> = args.fetch(token)?;

        t.stop();

        Ok(output.iter().copied().collect())
    }

    fn classify(&self, data: &[u8]) -> Result<ClassificationResult> {
        let image = load_image(data)?;
        let scores = self.run(&self.preprocess(&image))?;

        let result = ClassificationResult::from_label_scores(&self.labels, &scores, self.softmax)?;
        debug!("Local model scores: {:?}", result.entries());

        Ok(result)
    }
}

#[async_trait]
impl Classifier for TensorFlowClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> Backend {
        Backend::Local
    }

    async fn classify(&self, image: &[u8]) -> Result<ClassificationResult> {
        let model = Arc::clone(&self.model);
        let data = image.to_vec();

        tokio::task::spawn_blocking(move || model.classify(&data))
            .await
            .map_err(|e| Error::Model(format!("inference task failed: {}", e)))?
    }
}
