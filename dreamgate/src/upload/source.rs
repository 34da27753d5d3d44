//! Image source resolution.
//!
//! Composition and video requests reference input images as raw bytes, a
//! `data:` URI, or an http(s) URL. This module normalizes all three to
//! bytes before the upload handshake.

use super::UploadError;
use crate::upstream::Transport;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// One input image, before byte resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw bytes, already in hand.
    Bytes(Vec<u8>),
    /// A `data:<mime>;base64,<payload>` URI.
    DataUri(String),
    /// An http(s) URL fetched with the shared transport.
    Url(String),
}

impl ImageSource {
    /// Classifies a client-provided string reference.
    pub fn from_reference(reference: &str) -> Result<Self, UploadError> {
        let reference = reference.trim();
        if reference.starts_with("data:") {
            return Ok(Self::DataUri(reference.to_string()));
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(Self::Url(reference.to_string()));
        }
        Err(UploadError::Source(format!(
            "unsupported image reference '{}': expected data URI or http(s) URL",
            truncate(reference, 48)
        )))
    }

    /// Resolves the source to raw bytes.
    pub async fn resolve<T: Transport>(&self, transport: &T) -> Result<Vec<u8>, UploadError> {
        match self {
            Self::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(UploadError::Source("empty image payload".to_string()));
                }
                Ok(bytes.clone())
            }
            Self::DataUri(uri) => decode_data_uri(uri),
            Self::Url(url) => transport.get(url, &[]).await.map_err(|e| {
                UploadError::Network(format!("failed to fetch source image {}: {}", url, e))
            }),
        }
    }
}

/// Decodes the base64 payload of a `data:` URI.
fn decode_data_uri(uri: &str) -> Result<Vec<u8>, UploadError> {
    let payload = uri
        .split_once(";base64,")
        .map(|(_, payload)| payload)
        .ok_or_else(|| {
            UploadError::Source("data URI must carry a base64 payload".to_string())
        })?;

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| UploadError::Source(format!("invalid base64 in data URI: {}", e)))?;
    if bytes.is_empty() {
        return Err(UploadError::Source("empty image payload".to_string()));
    }
    Ok(bytes)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::MockTransport;

    #[test]
    fn test_from_reference_data_uri() {
        let source = ImageSource::from_reference("data:image/png;base64,aGk=").unwrap();
        assert!(matches!(source, ImageSource::DataUri(_)));
    }

    #[test]
    fn test_from_reference_url() {
        let source = ImageSource::from_reference("https://example.com/a.jpg").unwrap();
        assert_eq!(source, ImageSource::Url("https://example.com/a.jpg".into()));
    }

    #[test]
    fn test_from_reference_rejects_paths() {
        assert!(ImageSource::from_reference("/tmp/a.jpg").is_err());
        assert!(ImageSource::from_reference("").is_err());
    }

    #[tokio::test]
    async fn test_resolve_bytes() {
        let transport = MockTransport::new();
        let bytes = ImageSource::Bytes(vec![1, 2, 3])
            .resolve(&transport)
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_resolve_empty_bytes_is_error() {
        let transport = MockTransport::new();
        let err = ImageSource::Bytes(Vec::new())
            .resolve(&transport)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Source(_)));
    }

    #[tokio::test]
    async fn test_resolve_data_uri() {
        let transport = MockTransport::new();
        // "hello" in base64
        let bytes = ImageSource::DataUri("data:image/png;base64,aGVsbG8=".into())
            .resolve(&transport)
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_resolve_bad_base64() {
        let transport = MockTransport::new();
        let err = ImageSource::DataUri("data:image/png;base64,!!notb64!!".into())
            .resolve(&transport)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Source(_)));
    }

    #[tokio::test]
    async fn test_resolve_url_fetches_via_transport() {
        let transport = MockTransport::new();
        transport.push_ok(b"imagedata".to_vec());
        let bytes = ImageSource::Url("https://example.com/a.jpg".into())
            .resolve(&transport)
            .await
            .unwrap();
        assert_eq!(bytes, b"imagedata");
        assert_eq!(transport.recorded()[0].url, "https://example.com/a.jpg");
    }
}
