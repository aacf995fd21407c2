//! Pulls the image bytes out of an `/analyze` request.

use hyper::body::HttpBody;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Body, Request};
use log::debug;
use serde::Deserialize;

use fake_detect::payload::decode_base64_image;
use fake_detect::{Error, Result};

/// Multipart field carrying the upload.
const IMAGE_FIELD: &str = "image";

#[derive(Deserialize)]
struct AnalyzeRequest {
    image: Option<String>,
}

/// Accepts `application/json` with a base64 `image` field or
/// `multipart/form-data` with an `image` file.
pub async fn extract_image(req: Request<Body>, limit: usize) -> Result<Vec<u8>> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > limit) {
        return Err(Error::PayloadTooLarge { limit });
    }

    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "application/json" => {
            let raw = read_limited(req.into_body(), limit).await?;
            from_json(&raw)
        }
        "multipart/form-data" => from_multipart(req.into_body(), &content_type, limit).await,
        "" => Err(Error::UnsupportedMediaType(
            "missing Content-Type, send application/json or multipart/form-data".to_string(),
        )),
        other => Err(Error::UnsupportedMediaType(other.to_string())),
    }
}

async fn read_limited(mut body: Body, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();

    while let Some(chunk) = body.data().await {
        let chunk = chunk
            .map_err(|e| Error::InvalidInput(format!("could not read request body: {}", e)))?;

        if buf.len() + chunk.len() > limit {
            return Err(Error::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf)
}

fn from_json(raw: &[u8]) -> Result<Vec<u8>> {
    let request: AnalyzeRequest = serde_json::from_slice(raw)
        .map_err(|e| Error::InvalidInput(format!("invalid JSON body: {}", e)))?;

    let image = request
        .image
        .ok_or_else(|| Error::InvalidInput("missing `image` field".to_string()))?;

    decode_base64_image(&image)
}

async fn from_multipart(body: Body, content_type: &str, limit: usize) -> Result<Vec<u8>> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| Error::InvalidInput(format!("bad multipart header: {}", e)))?;

    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().whole_stream(limit as u64));
    let mut multipart = multer::Multipart::with_constraints(body, boundary, constraints);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        if bytes.is_empty() {
            return Err(Error::InvalidInput("uploaded image is empty".to_string()));
        }

        return Ok(bytes.to_vec());
    }

    Err(Error::InvalidInput(format!(
        "missing `{}` file field",
        IMAGE_FIELD
    )))
}

fn multipart_error(err: multer::Error, limit: usize) -> Error {
    match err {
        multer::Error::StreamSizeExceeded { .. } | multer::Error::FieldSizeExceeded { .. } => {
            Error::PayloadTooLarge { limit }
        }
        other => Error::InvalidInput(format!("bad multipart body: {}", other)),
    }
}
