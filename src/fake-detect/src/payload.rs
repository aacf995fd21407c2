//! Image payload decoding and fetching.

use image::{DynamicImage, ImageFormat};
use log::debug;

use crate::error::{Error, Result};
use crate::Timer;

/// Decode a base64 image, with or without a `data:image/...;base64,` prefix.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>> {
    let payload = payload.trim();

    let encoded = if payload.starts_with("data:") {
        match payload.split_once(',') {
            Some((_, data)) => data,
            None => {
                return Err(Error::InvalidInput(
                    "data URL has no payload after ','".to_string(),
                ))
            }
        }
    } else {
        payload
    };

    // line-wrapped base64 is common in browser uploads
    let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    if encoded.is_empty() {
        return Err(Error::InvalidInput("image payload is empty".to_string()));
    }

    let bytes = base64::decode(&encoded)?;
    debug!("Decoded {} byte image payload", bytes.len());

    Ok(bytes)
}

/// Identify the image format from its magic bytes.
pub fn sniff_format(data: &[u8]) -> Result<ImageFormat> {
    if data.is_empty() {
        return Err(Error::InvalidInput("image payload is empty".to_string()));
    }

    image::guess_format(data).map_err(|e| Error::UnsupportedImage(e.to_string()))
}

pub fn load_image(data: &[u8]) -> Result<DynamicImage> {
    let mut t = Timer::new_start("Load image from memory");

    let format = sniff_format(data)?;
    let image = image::load_from_memory_with_format(data, format)
        .map_err(|e| Error::UnsupportedImage(e.to_string()))?;

    t.stop();

    Ok(image)
}

/// Download an image over HTTP(S).
pub async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let mut t = Timer::new_start(&format!("Fetching image from {}", url));

    let response = http.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: format!("could not fetch image from {}", url),
        });
    }

    let bytes = response.bytes().await?.to_vec();

    t.stop();

    sniff_format(&bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 1x1 PNG.
    const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

    #[test]
    fn data_url_and_bare_base64_match() {
        let bare = decode_base64_image(PIXEL_PNG).unwrap();
        let url = decode_base64_image(&format!("data:image/png;base64,{}", PIXEL_PNG)).unwrap();

        assert_eq!(bare, url);
        assert_eq!(&bare[1..4], b"PNG");
    }

    #[test]
    fn tolerates_wrapped_lines() {
        let (head, tail) = PIXEL_PNG.split_at(40);
        let wrapped = format!("  {}\n{}\r\n", head, tail);

        assert_eq!(
            decode_base64_image(&wrapped).unwrap(),
            decode_base64_image(PIXEL_PNG).unwrap()
        );
    }

    #[test]
    fn rejects_empty_payloads() {
        assert!(matches!(decode_base64_image("   "), Err(Error::InvalidInput(_))));
        assert!(matches!(
            decode_base64_image("data:image/png;base64,"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            decode_base64_image("data:image/png;base64"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_bad_base64() {
        assert!(matches!(decode_base64_image("not*base64!"), Err(Error::Base64(_))));
    }

    #[test]
    fn sniffs_png() {
        let bytes = decode_base64_image(PIXEL_PNG).unwrap();
        assert_eq!(sniff_format(&bytes).unwrap(), ImageFormat::Png);

        let image = load_image(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (1, 1));
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(
            sniff_format(b"plain text, not an image"),
            Err(Error::UnsupportedImage(_))
        ));
        assert!(matches!(sniff_format(b""), Err(Error::InvalidInput(_))));
    }
}
