use std::convert::Infallible;
use std::sync::Arc;

use hyper::header::{self, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{info, warn};
use serde::Serialize;
use serde_json::json;

use fake_detect::{Backend, Classifier, Error, Normalizer, Timer, Verdict};

use crate::body::extract_image;

/// Shared by every connection. Built once in `main`.
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub normalizer: Normalizer,
    pub max_body_bytes: usize,
}

#[derive(Serialize)]
struct AnalyzeResponse<'a> {
    #[serde(flatten)]
    verdict: Verdict,
    model_used: &'a str,
    elapsed_ms: i64,
}

pub async fn handle(
    req: Request<Body>,
    state: Arc<AppState>,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!("{} {}", method, path);

    let mut response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => empty(StatusCode::NO_CONTENT),
        (&Method::GET, "/") => home(&state),
        (&Method::GET, "/health") => health(&state),
        (&Method::GET, "/model-info") => model_info(&state),
        (&Method::POST, "/analyze") => analyze(req, &state).await,
        (_, "/") | (_, "/health") | (_, "/model-info") | (_, "/analyze") => error_body(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            &format!("{} is not allowed here", method),
        ),
        (_, path) => error_body(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("no route for {}", path),
        ),
    };

    allow_cors(&mut response);
    Ok(response)
}

fn home(state: &AppState) -> Response<Body> {
    json_body(
        StatusCode::OK,
        &json!({
            "message": "Fake Detector API is running",
            "model": state.classifier.name(),
            "endpoints": {
                "health": "/health",
                "model_info": "/model-info",
                "analyze": "/analyze"
            }
        }),
    )
}

fn health(state: &AppState) -> Response<Body> {
    json_body(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "model": state.classifier.name(),
            "backend": state.classifier.backend().to_string(),
            "model_loaded": true,
            "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0
        }),
    )
}

fn model_info(state: &AppState) -> Response<Body> {
    let name = state.classifier.name();
    let backend = state.classifier.backend();

    let mut info = json!({
        "model_name": name,
        "backend": backend.to_string(),
        "description": "AI-generated vs real image classification",
        "fake_keywords": state.normalizer.keywords().keywords(),
    });

    // Only hosted models have a model card to link to
    if backend == Backend::Remote {
        info["url"] = json!(format!("https://huggingface.co/{}", name));
    }

    json_body(StatusCode::OK, &info)
}

async fn analyze(req: Request<Body>, state: &AppState) -> Response<Body> {
    let mut t = Timer::new_start("Handling request");

    let verdict = run_analysis(req, state).await;

    t.stop();

    match verdict {
        Ok(verdict) => {
            info!(
                "Verdict {:?} with {:.2}% confidence",
                verdict.prediction, verdict.confidence
            );
            json_body(
                StatusCode::OK,
                &AnalyzeResponse {
                    verdict,
                    model_used: state.classifier.name(),
                    elapsed_ms: t.elapsed_ms(),
                },
            )
        }
        Err(err) => {
            warn!("Analysis failed: {}", err);
            error_body(status_for(&err), err.code(), &err.to_string())
        }
    }
}

async fn run_analysis(req: Request<Body>, state: &AppState) -> fake_detect::Result<Verdict> {
    let image = extract_image(req, state.max_body_bytes).await?;
    let result = state.classifier.classify(&image).await?;
    state.normalizer.normalize(&result)
}

/// HTTP status for each error class.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_) | Error::Base64(_) => StatusCode::BAD_REQUEST,
        Error::UnsupportedImage(_) | Error::UnsupportedMediaType(_) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::InsufficientResults { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::MalformedClassificationResult { .. }
        | Error::Http(_)
        | Error::Api { .. }
        | Error::AuthenticationFailed
        | Error::ModelNotFound(_) => StatusCode::BAD_GATEWAY,
        Error::ModelLoading { .. } | Error::RateLimited => StatusCode::SERVICE_UNAVAILABLE,
        Error::Model(_) | Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_body<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => {
            warn!("Could not serialize response: {}", err);
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response<Body> {
    json_body(
        status,
        &json!({
            "error": {
                "code": code,
                "message": message
            }
        }),
    )
}

fn empty(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn allow_cors(response: &mut Response<Body>) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use fake_detect::payload::decode_base64_image;
    use fake_detect::{ClassificationEntry, ClassificationResult, KeywordSet, Selection};
    use serde_json::Value;

    const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

    enum Reply {
        Entries(Vec<(&'static str, f64)>),
        Fail(fn() -> Error),
    }

    struct StubClassifier {
        backend: Backend,
        reply: Reply,
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        fn name(&self) -> &str {
            "stub/detector"
        }

        fn backend(&self) -> Backend {
            self.backend
        }

        async fn classify(&self, image: &[u8]) -> fake_detect::Result<ClassificationResult> {
            assert!(!image.is_empty());
            match &self.reply {
                Reply::Entries(pairs) => Ok(pairs
                    .iter()
                    .map(|(label, score)| ClassificationEntry::new(*label, *score))
                    .collect::<Vec<_>>()
                    .into()),
                Reply::Fail(make) => Err(make()),
            }
        }
    }

    fn state(reply: Reply) -> Arc<AppState> {
        state_on(Backend::Remote, reply)
    }

    fn state_on(backend: Backend, reply: Reply) -> Arc<AppState> {
        Arc::new(AppState {
            classifier: Arc::new(StubClassifier { backend, reply }),
            normalizer: Normalizer::new(KeywordSet::default(), Selection::TopScores).strict(true),
            max_body_bytes: 64 * 1024,
        })
    }

    fn fake_wins() -> Arc<AppState> {
        state(Reply::Entries(vec![("artificial", 0.82), ("real", 0.18)]))
    }

    async fn send(state: Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
        let response = handle(req, state).await.unwrap();
        let status = response.status();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(body: Value) -> Request<Body> {
        Request::post("/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
        let boundary = "X-FAKE-DETECT-BOUNDARY";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"pixel.png\"\r\n",
                field
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::post("/analyze")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn analyze_base64_json() {
        let (status, body) = send(fake_wins(), json_request(json!({ "image": PIXEL_PNG }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], "FAKE");
        assert_eq!(body["confidence"], 82.0);
        assert_eq!(body["probabilities"], json!({"real": 18.0, "fake": 82.0}));
        assert_eq!(body["model_used"], "stub/detector");
        assert!(body["elapsed_ms"].is_i64());
    }

    #[tokio::test]
    async fn analyze_data_url() {
        let image = format!("data:image/png;base64,{}", PIXEL_PNG);
        let (status, body) = send(fake_wins(), json_request(json!({ "image": image }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], "FAKE");
    }

    #[tokio::test]
    async fn analyze_multipart_matches_json() {
        let pixel = decode_base64_image(PIXEL_PNG).unwrap();

        let (status, multipart) = send(fake_wins(), multipart_request("image", &pixel)).await;
        let (_, json) = send(fake_wins(), json_request(json!({ "image": PIXEL_PNG }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(multipart["prediction"], json["prediction"]);
        assert_eq!(multipart["probabilities"], json["probabilities"]);
    }

    #[tokio::test]
    async fn multipart_without_image_field() {
        let (status, body) = send(fake_wins(), multipart_request("file", b"abc")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    #[tokio::test]
    async fn input_errors_are_distinguishable() {
        let (status, body) = send(fake_wins(), json_request(json!({ "picture": PIXEL_PNG }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");

        let (status, body) = send(fake_wins(), json_request(json!({ "image": "%%%" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_base64");

        let req = Request::post("/analyze")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let (status, body) = send(fake_wins(), req).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"]["code"], "unsupported_media_type");
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let huge = "A".repeat(128 * 1024);
        let (status, body) = send(fake_wins(), json_request(json!({ "image": huge }))).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "payload_too_large");
    }

    #[tokio::test]
    async fn classifier_failures_keep_their_class() {
        fn loading() -> Error {
            Error::ModelLoading {
                estimated_time: Some(20.0),
            }
        }
        fn auth() -> Error {
            Error::AuthenticationFailed
        }
        fn session() -> Error {
            Error::Model("session failed".to_string())
        }

        let cases = vec![
            (
                loading as fn() -> Error,
                StatusCode::SERVICE_UNAVAILABLE,
                "model_loading",
            ),
            (
                auth as fn() -> Error,
                StatusCode::BAD_GATEWAY,
                "upstream_auth_failed",
            ),
            (
                session as fn() -> Error,
                StatusCode::INTERNAL_SERVER_ERROR,
                "model_error",
            ),
        ];

        for (make, expected_status, expected_code) in cases {
            let (status, body) = send(
                state(Reply::Fail(make)),
                json_request(json!({ "image": PIXEL_PNG })),
            )
            .await;
            assert_eq!(status, expected_status);
            assert_eq!(body["error"]["code"], expected_code);
        }
    }

    #[tokio::test]
    async fn short_results_surface_in_strict_mode() {
        let (status, body) = send(
            state(Reply::Entries(vec![("fake", 0.99)])),
            json_request(json!({ "image": PIXEL_PNG })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "insufficient_results");
    }

    #[tokio::test]
    async fn info_routes() {
        let get = |path: &str| Request::get(path).body(Body::empty()).unwrap();

        let (status, body) = send(fake_wins(), get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["analyze"], "/analyze");

        let (status, body) = send(fake_wins(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["backend"], "remote");

        let (status, body) = send(fake_wins(), get("/model-info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_name"], "stub/detector");
        assert_eq!(body["url"], "https://huggingface.co/stub/detector");
    }

    #[tokio::test]
    async fn local_model_info_has_no_hub_url() {
        let local = state_on(Backend::Local, Reply::Entries(vec![]));

        let (status, body) = send(local, Request::get("/model-info").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "local");
        assert!(body.get("url").is_none());
    }

    #[tokio::test]
    async fn routing_errors_and_preflight() {
        let (status, body) = send(
            fake_wins(),
            Request::get("/analyze").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"]["code"], "method_not_allowed");

        let (status, _) = send(
            fake_wins(),
            Request::get("/predict").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            fake_wins(),
            Request::options("/analyze").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }
}
