use log::info;
use serde::Serialize;
use structopt::StructOpt;

use fake_detect::payload::fetch_image;
use fake_detect::{ClassificationResult, ClassifierOpts, NormalizerOpts, Verdict};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "fake-classify",
    about = "CLI app to tell real images from AI-generated ones"
)]
struct CmdArgs {
    #[structopt(help = "Image file path or http(s) URL to fetch it from")]
    image: String,

    #[structopt(long, help = "Include the classifier's raw label/score pairs")]
    raw: bool,

    #[structopt(flatten)]
    classifier: ClassifierOpts,

    #[structopt(flatten)]
    normalizer: NormalizerOpts,
}

#[derive(Serialize)]
struct Output<'a> {
    #[serde(flatten)]
    verdict: Verdict,
    model_used: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<&'a ClassificationResult>,
}

fn is_url(image: &str) -> bool {
    image.starts_with("http://") || image.starts_with("https://")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = CmdArgs::from_args();

    let classifier = args.classifier.build()?;
    let normalizer = args.normalizer.build()?;

    let image = if is_url(&args.image) {
        fetch_image(&reqwest::Client::new(), &args.image).await?
    } else {
        tokio::fs::read(&args.image).await?
    };
    info!("Read {} bytes from {}", image.len(), args.image);

    let result = classifier.classify(&image).await?;
    let verdict = normalizer.normalize(&result)?;

    let output = Output {
        verdict,
        model_used: classifier.name(),
        raw: if args.raw { Some(&result) } else { None },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake_detect::{ClassificationEntry, Normalizer};

    #[test]
    fn recognizes_urls() {
        assert!(is_url("https://example.com/cat.png"));
        assert!(is_url("http://localhost:8000/cat.jpg"));
        assert!(!is_url("./https-cat.png"));
        assert!(!is_url("/tmp/cat.png"));
    }

    #[test]
    fn raw_entries_are_optional() {
        let result = ClassificationResult::new(vec![
            ClassificationEntry::new("real", 0.6),
            ClassificationEntry::new("fake", 0.4),
        ]);
        let verdict = Normalizer::default().normalize(&result).unwrap();

        let plain = serde_json::to_value(&Output {
            verdict,
            model_used: "m",
            raw: None,
        })
        .unwrap();
        assert_eq!(plain["prediction"], "REAL");
        assert!(plain.get("raw").is_none());

        let with_raw = serde_json::to_value(&Output {
            verdict,
            model_used: "m",
            raw: Some(&result),
        })
        .unwrap();
        assert_eq!(with_raw["raw"][1]["label"], "fake");
    }

    #[test]
    fn parses_arguments() {
        let args = CmdArgs::from_iter_safe(vec!["fake-classify", "cat.png", "--raw"]).unwrap();
        assert_eq!(args.image, "cat.png");
        assert!(args.raw);
    }
}
