use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Content types accepted for remote image download (§4.4).
pub const ALLOWED_IMAGE_CONTENT_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
];

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Issues and verifies HMAC-signed media URLs (§4.4), served at
/// `GET /media/image/<tenant_id>/<filename>?token=<t>&expires=<unix>`.
pub struct MediaSigner {
    secret: String,
}

impl MediaSigner {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    fn signature(&self, tenant_id: Uuid, filename: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(tenant_id.to_string().as_bytes());
        mac.update(filename.as_bytes());
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Issues a token good for `ttl_seconds` (defaults to 24h) from now.
    pub fn issue(&self, tenant_id: Uuid, filename: &str, ttl_seconds: Option<i64>) -> (String, i64) {
        let expires = chrono::Utc::now().timestamp() + ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
        (self.signature(tenant_id, filename, expires), expires)
    }

    /// `verify(token, tenant_id, filename, expires) = true iff token ==
    /// HMAC(secret, tenant_id||filename||expires) and now <= expires` (§8 invariant).
    pub fn verify(&self, tenant_id: Uuid, filename: &str, expires: i64, token: &str) -> bool {
        if chrono::Utc::now().timestamp() > expires {
            return false;
        }
        let expected = self.signature(tenant_id, filename, expires);
        constant_time_eq(expected.as_bytes(), token.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Source of an inbound image part's `url` field (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Base64 { mime: String, data: String },
    Remote(String),
    Local(String),
}

impl ImageSource {
    pub fn parse(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((mime_part, data)) = rest.split_once(";base64,") {
                return Self::Base64 {
                    mime: mime_part.to_string(),
                    data: data.to_string(),
                };
            }
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Self::Local(path.to_string());
        }
        Self::Remote(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_unexpired_token() {
        let signer = MediaSigner::new("secret".to_string());
        let tenant_id = Uuid::new_v4();
        let (token, expires) = signer.issue(tenant_id, "photo.png", None);
        assert!(signer.verify(tenant_id, "photo.png", expires, &token));
    }

    #[test]
    fn verify_rejects_expired_token() {
        let signer = MediaSigner::new("secret".to_string());
        let tenant_id = Uuid::new_v4();
        let expired = chrono::Utc::now().timestamp() - 10;
        let token = signer.signature(tenant_id, "photo.png", expired);
        assert!(!signer.verify(tenant_id, "photo.png", expired, &token));
    }

    #[test]
    fn verify_rejects_wrong_filename() {
        let signer = MediaSigner::new("secret".to_string());
        let tenant_id = Uuid::new_v4();
        let (token, expires) = signer.issue(tenant_id, "photo.png", None);
        assert!(!signer.verify(tenant_id, "other.png", expires, &token));
    }

    #[test]
    fn parses_base64_data_url() {
        let source = ImageSource::parse("data:image/png;base64,AAAA");
        assert_eq!(
            source,
            ImageSource::Base64 {
                mime: "image/png".to_string(),
                data: "AAAA".to_string(),
            }
        );
    }

    #[test]
    fn parses_remote_and_local_urls() {
        assert_eq!(
            ImageSource::parse("https://example.com/a.png"),
            ImageSource::Remote("https://example.com/a.png".to_string())
        );
        assert_eq!(ImageSource::parse("file:///tmp/a.png"), ImageSource::Local("/tmp/a.png".to_string()));
    }
}
