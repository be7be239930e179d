use crate::media::{ImageSource, ALLOWED_IMAGE_CONTENT_TYPES, MAX_IMAGE_BYTES};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use guardrails_shared::{GuardrailsError, Result};
use std::path::Path;
use uuid::Uuid;

/// Result of processing one image part for an inspection call (§4.4). `saved_path`
/// is recorded on the detection record; the classifier always gets something it can
/// consume directly (the original data URL, or a freshly-issued signed URL for
/// content that was only ever a remote/local path).
pub struct ProcessedImage {
    pub saved_path: Option<String>,
}

/// Decodes-and-saves base64 images, downloads remote images (size-limited,
/// content-type whitelisted), and passes local paths through untouched (§4.4),
/// grounded on spec.md's description of the three `url` forms an image part can take.
pub struct ImageProcessor {
    http: reqwest::Client,
    media_dir: String,
}

impl ImageProcessor {
    pub fn new(media_dir: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("image download http client");
        Self { http, media_dir }
    }

    /// Processes one `image_url.url` value, saving the decoded/downloaded bytes
    /// under `<media_dir>/<tenant_id>/<uuid>.<ext>` when applicable.
    pub async fn process(&self, url: &str, tenant_id: Uuid) -> Result<ProcessedImage> {
        match ImageSource::parse(url) {
            ImageSource::Base64 { mime, data } => {
                let ext = ext_for_mime(&mime).unwrap_or("bin");
                let bytes = BASE64
                    .decode(&data)
                    .map_err(|e| GuardrailsError::ImageError(format!("invalid base64 image data: {e}")))?;
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(GuardrailsError::ImageError("image exceeds 10 MiB limit".to_string()));
                }
                let saved_path = self.save(tenant_id, ext, &bytes).await?;
                Ok(ProcessedImage { saved_path: Some(saved_path) })
            }
            ImageSource::Remote(remote_url) => {
                let response = self
                    .http
                    .get(&remote_url)
                    .send()
                    .await
                    .map_err(|e| GuardrailsError::ImageError(format!("image download failed: {e}")))?;

                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.split(';').next().unwrap_or(s).trim().to_lowercase())
                    .unwrap_or_default();
                if !ALLOWED_IMAGE_CONTENT_TYPES.contains(&content_type.as_str()) {
                    return Err(GuardrailsError::ImageError(format!(
                        "unsupported image content type: {content_type}"
                    )));
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| GuardrailsError::ImageError(format!("image download failed: {e}")))?;
                if bytes.len() > MAX_IMAGE_BYTES {
                    return Err(GuardrailsError::ImageError("image exceeds 10 MiB limit".to_string()));
                }

                let ext = ext_for_mime(&content_type).unwrap_or("bin");
                let saved_path = self.save(tenant_id, ext, &bytes).await?;
                Ok(ProcessedImage { saved_path: Some(saved_path) })
            }
            ImageSource::Local(_path) => Ok(ProcessedImage { saved_path: None }),
        }
    }

    async fn save(&self, tenant_id: Uuid, ext: &str, bytes: &[u8]) -> Result<String> {
        let dir = Path::new(&self.media_dir).join(tenant_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| GuardrailsError::InternalError(format!("creating media dir: {e}")))?;

        let filename = format!("{}.{ext}", Uuid::new_v4());
        let path = dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| GuardrailsError::InternalError(format!("writing media file: {e}")))?;

        Ok(path.to_string_lossy().to_string())
    }
}

fn ext_for_mime(mime: &str) -> Option<&'static str> {
    match mime.trim_start_matches("image/") {
        "jpeg" | "jpg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "bmp" => Some("bmp"),
        "webp" => Some("webp"),
        "tiff" => Some("tiff"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn base64_image_round_trips_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let processor = ImageProcessor::new(dir.path().to_str().unwrap().to_string());
        let tenant_id = Uuid::new_v4();
        let data = BASE64.encode(b"not-really-a-png");
        let url = format!("data:image/png;base64,{data}");

        let processed = processor.process(&url, tenant_id).await.unwrap();
        let path = processed.saved_path.unwrap();
        assert!(path.ends_with(".png"));
        assert!(tokio::fs::metadata(&path).await.is_ok());
    }

    #[tokio::test]
    async fn local_file_url_is_passed_through_without_saving() {
        let dir = tempfile::tempdir().unwrap();
        let processor = ImageProcessor::new(dir.path().to_str().unwrap().to_string());
        let processed = processor.process("file:///tmp/photo.png", Uuid::new_v4()).await.unwrap();
        assert!(processed.saved_path.is_none());
    }

    #[tokio::test]
    async fn oversized_base64_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let processor = ImageProcessor::new(dir.path().to_str().unwrap().to_string());
        let huge = vec![0u8; MAX_IMAGE_BYTES + 1];
        let data = BASE64.encode(&huge);
        let url = format!("data:image/png;base64,{data}");
        let result = processor.process(&url, Uuid::new_v4()).await;
        assert!(result.is_err());
    }
}
