//! The four-step upload handshake.
//!
//! Apply and commit talk to the blob-store control endpoint with SigV4
//! signatures; the byte push goes to the upload host issued by apply,
//! authorized by the grant's own `Auth` value and integrity-checked with
//! `Content-CRC32`.

use super::sigv4::{self, SigningParams};
use super::source::ImageSource;
use super::UploadError;
use crate::upstream::{ResolvedEndpoints, Transport, TransportError, UploadToken};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between consecutive uploads of one batch.
///
/// The upstream throttles rapid sequential uploads from a single session;
/// uploads MUST stay serialized with this gap between them. No pause is
/// taken after the final upload.
pub const INTER_UPLOAD_PAUSE: Duration = Duration::from_secs(2);

/// Maximum attempts for the byte push and commit steps.
pub const UPLOAD_MAX_ATTEMPTS: u32 = 3;

/// API version of the blob-store control actions.
const IMAGEX_API_VERSION: &str = "2018-08-01";

/// SigV4 service name of the blob store.
const IMAGEX_SERVICE: &str = "imagex";

/// UriStatus value meaning "upload finalized".
const URI_STATUS_OK: i64 = 2000;

/// Drives the signed upload handshake against the blob store.
#[derive(Clone)]
pub struct UploadPipeline<T: Transport> {
    transport: T,
}

/// Slot grant returned by ApplyImageUpload.
#[derive(Debug, Clone)]
struct UploadGrant {
    store_uri: String,
    store_auth: String,
    upload_host: String,
    session_key: String,
}

impl<T: Transport> UploadPipeline<T> {
    /// Creates a pipeline over a (typically shared) transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Uploads a batch of source images sequentially.
    ///
    /// Returns the store URIs in input order. Uploads are strictly
    /// serialized with [`INTER_UPLOAD_PAUSE`] between consecutive uploads.
    pub async fn upload_all(
        &self,
        token: &UploadToken,
        endpoints: &ResolvedEndpoints,
        sources: &[ImageSource],
    ) -> Result<Vec<String>, UploadError> {
        let mut uris = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(INTER_UPLOAD_PAUSE).await;
            }
            let bytes = source.resolve(&self.transport).await?;
            let uri = self.upload_one(token, endpoints, bytes).await?;
            info!(index = index, uri = %uri, "Source image uploaded");
            uris.push(uri);
        }
        Ok(uris)
    }

    /// Uploads one image: apply → push bytes → commit.
    pub async fn upload_one(
        &self,
        token: &UploadToken,
        endpoints: &ResolvedEndpoints,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let grant = self.apply(token, endpoints, bytes.len()).await?;
        self.put_bytes(&grant, &bytes).await?;
        self.commit(token, endpoints, &grant).await
    }

    /// Step 2: ApplyImageUpload. Not retried; failures here are almost
    /// always credential failures and a retry would re-sign the same
    /// rejected token.
    async fn apply(
        &self,
        token: &UploadToken,
        endpoints: &ResolvedEndpoints,
        file_size: usize,
    ) -> Result<UploadGrant, UploadError> {
        let service_id = service_id(token, endpoints);
        let file_size = file_size.to_string();
        let query = sigv4::canonical_query(&[
            ("Action", "ApplyImageUpload"),
            ("Version", IMAGEX_API_VERSION),
            ("ServiceId", &service_id),
            ("FileSize", &file_size),
        ]);

        let amz_date = sigv4::amz_date(chrono::Utc::now());
        let authorization = sigv4::sign_get(&signing_params(token, endpoints, &amz_date), "/", &query);
        let url = format!("{}/?{}", endpoints.imagex_base, query);

        debug!(service_id = %service_id, "Applying for upload slot");
        let response = self
            .transport
            .get(
                &url,
                &[
                    ("x-amz-date", amz_date.as_str()),
                    ("x-amz-security-token", token.session_token.as_str()),
                    ("Authorization", authorization.as_str()),
                    ("Origin", endpoints.origin.as_str()),
                    ("Referer", endpoints.origin.as_str()),
                ],
            )
            .await
            .map_err(|e| match e {
                TransportError::Status { status, body } => UploadError::Auth(format!(
                    "ApplyImageUpload rejected (HTTP {}): {}",
                    status, body
                )),
                other => UploadError::Network(other.to_string()),
            })?;

        let apply: ApplyResponse = serde_json::from_slice(&response).map_err(|e| {
            UploadError::Network(format!("malformed ApplyImageUpload response: {}", e))
        })?;
        let address = apply
            .result
            .map(|r| r.upload_address)
            .ok_or_else(|| UploadError::Auth("ApplyImageUpload returned no result".to_string()))?;

        let store = address.store_infos.into_iter().next().ok_or_else(|| {
            UploadError::Auth("ApplyImageUpload returned no store info".to_string())
        })?;
        let upload_host = address.upload_hosts.into_iter().next().ok_or_else(|| {
            UploadError::Auth("ApplyImageUpload returned no upload host".to_string())
        })?;

        Ok(UploadGrant {
            store_uri: store.store_uri,
            store_auth: store.auth,
            upload_host,
            session_key: address.session_key,
        })
    }

    /// Step 3: push the bytes to the issued upload host.
    async fn put_bytes(&self, grant: &UploadGrant, bytes: &[u8]) -> Result<(), UploadError> {
        let crc = format!("{:08x}", crc32fast::hash(bytes));
        let url = format!("https://{}/upload/v1/{}", grant.upload_host, grant.store_uri);

        let mut last_err = None;
        for attempt in 1..=UPLOAD_MAX_ATTEMPTS {
            let result = self
                .transport
                .post_bytes(
                    &url,
                    bytes.to_vec(),
                    &[
                        ("Authorization", grant.store_auth.as_str()),
                        ("Content-Type", "application/octet-stream"),
                        ("Content-CRC32", crc.as_str()),
                    ],
                )
                .await;

            match result {
                Ok(_) => {
                    debug!(bytes = bytes.len(), attempt = attempt, "Upload bytes accepted");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Upload byte push failed");
                    if attempt < UPLOAD_MAX_ATTEMPTS {
                        tokio::time::sleep(retry_delay(attempt, &e)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(final_error(last_err, "byte push"))
    }

    /// Step 4: CommitImageUpload. The date and signature are re-derived on
    /// every attempt; an expired signature would otherwise fail all
    /// retries identically.
    async fn commit(
        &self,
        token: &UploadToken,
        endpoints: &ResolvedEndpoints,
        grant: &UploadGrant,
    ) -> Result<String, UploadError> {
        let service_id = service_id(token, endpoints);
        let query = sigv4::canonical_query(&[
            ("Action", "CommitImageUpload"),
            ("Version", IMAGEX_API_VERSION),
            ("ServiceId", &service_id),
        ]);
        let url = format!("{}/?{}", endpoints.imagex_base, query);
        let body = serde_json::json!({ "SessionKey": grant.session_key }).to_string();

        let mut last_err = None;
        for attempt in 1..=UPLOAD_MAX_ATTEMPTS {
            let amz_date = sigv4::amz_date(chrono::Utc::now());
            let authorization = sigv4::sign_post(
                &signing_params(token, endpoints, &amz_date),
                "/",
                &query,
                body.as_bytes(),
            );

            let result = self
                .transport
                .post_json(
                    &url,
                    &body,
                    &[
                        ("x-amz-date", amz_date.as_str()),
                        ("x-amz-security-token", token.session_token.as_str()),
                        ("Authorization", authorization.as_str()),
                        ("Origin", endpoints.origin.as_str()),
                        ("Referer", endpoints.origin.as_str()),
                    ],
                )
                .await;

            match result {
                Ok(response) => return parse_commit(&response),
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Upload commit failed");
                    if attempt < UPLOAD_MAX_ATTEMPTS {
                        tokio::time::sleep(retry_delay(attempt, &e)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(final_error(last_err, "commit"))
    }
}

/// Linear backoff: `attempt × 2s` after a status failure, `attempt × 3s`
/// after a network failure.
fn retry_delay(attempt: u32, err: &TransportError) -> Duration {
    let base = if err.is_network() { 3 } else { 2 };
    Duration::from_secs(u64::from(attempt) * base)
}

fn final_error(last_err: Option<TransportError>, step: &str) -> UploadError {
    match last_err {
        Some(TransportError::Timeout(msg)) => {
            UploadError::Timeout(format!("upload {} timed out: {}", step, msg))
        }
        Some(e) => UploadError::Network(format!("upload {} failed: {}", step, e)),
        None => UploadError::Network(format!("upload {} failed", step)),
    }
}

fn service_id(token: &UploadToken, endpoints: &ResolvedEndpoints) -> String {
    token
        .service_id
        .clone()
        .unwrap_or_else(|| endpoints.service_id.clone())
}

fn signing_params<'a>(
    token: &'a UploadToken,
    endpoints: &'a ResolvedEndpoints,
    amz_date: &'a str,
) -> SigningParams<'a> {
    SigningParams {
        access_key: &token.access_key,
        secret_key: &token.secret_key,
        session_token: &token.session_token,
        region: &endpoints.aws_region,
        service: IMAGEX_SERVICE,
        host: endpoints.imagex_host(),
        amz_date,
    }
}

fn parse_commit(response: &[u8]) -> Result<String, UploadError> {
    let commit: CommitResponse = serde_json::from_slice(response).map_err(|e| {
        UploadError::Network(format!("malformed CommitImageUpload response: {}", e))
    })?;

    let entry = commit
        .result
        .and_then(|r| r.results.into_iter().next())
        .ok_or_else(|| UploadError::CommitFailed {
            uri_status: 0,
            payload: String::from_utf8_lossy(response).into_owned(),
        })?;

    if entry.uri_status != URI_STATUS_OK {
        return Err(UploadError::CommitFailed {
            uri_status: entry.uri_status,
            payload: String::from_utf8_lossy(response).into_owned(),
        });
    }
    Ok(entry.uri)
}

#[derive(Debug, Deserialize)]
struct ApplyResponse {
    #[serde(rename = "Result")]
    result: Option<ApplyResult>,
}

#[derive(Debug, Deserialize)]
struct ApplyResult {
    #[serde(rename = "UploadAddress")]
    upload_address: UploadAddress,
}

#[derive(Debug, Deserialize)]
struct UploadAddress {
    #[serde(rename = "StoreInfos")]
    store_infos: Vec<StoreInfo>,
    #[serde(rename = "UploadHosts")]
    upload_hosts: Vec<String>,
    #[serde(rename = "SessionKey")]
    session_key: String,
}

#[derive(Debug, Deserialize)]
struct StoreInfo {
    #[serde(rename = "StoreUri")]
    store_uri: String,
    #[serde(rename = "Auth")]
    auth: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(rename = "Result")]
    result: Option<CommitResult>,
}

#[derive(Debug, Deserialize)]
struct CommitResult {
    #[serde(rename = "Results")]
    results: Vec<CommitEntry>,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    #[serde(rename = "Uri")]
    uri: String,
    #[serde(rename = "UriStatus")]
    uri_status: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorSettings;
    use crate::credential::Region;
    use crate::upstream::{resolve_endpoints, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn token() -> UploadToken {
        UploadToken {
            access_key: "AK".into(),
            secret_key: "SK".into(),
            session_token: "ST".into(),
            service_id: None,
        }
    }

    fn endpoints() -> ResolvedEndpoints {
        resolve_endpoints(Region::Cn, &MirrorSettings::default())
    }

    fn apply_response() -> serde_json::Value {
        json!({
            "Result": {
                "UploadAddress": {
                    "StoreInfos": [{"StoreUri": "store/abc123", "Auth": "store-auth"}],
                    "UploadHosts": ["upload-host.example.com"],
                    "SessionKey": "sess-key"
                }
            }
        })
    }

    fn commit_response(uri_status: i64) -> serde_json::Value {
        json!({
            "Result": {
                "Results": [{"Uri": "store/abc123", "UriStatus": uri_status}]
            }
        })
    }

    #[tokio::test]
    async fn test_upload_one_happy_path() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(apply_response());
        mock.push_json(json!({"code": 2000}));
        mock.push_json(commit_response(2000));

        let pipeline = UploadPipeline::new(mock.clone());
        let uri = pipeline
            .upload_one(&token(), &endpoints(), b"image-bytes".to_vec())
            .await
            .unwrap();

        assert_eq!(uri, "store/abc123");
        let recorded = mock.recorded();
        assert_eq!(recorded.len(), 3);

        // Apply: signed GET against the imagex control endpoint.
        assert_eq!(recorded[0].method, "GET");
        assert!(recorded[0].url.contains("Action=ApplyImageUpload"));
        assert!(recorded[0].url.contains("ServiceId=tb4s082cfz"));
        assert!(recorded[0]
            .headers
            .iter()
            .any(|(n, v)| n == "Authorization" && v.starts_with("AWS4-HMAC-SHA256")));

        // Byte push: issued host, CRC header, grant authorization.
        assert_eq!(
            recorded[1].url,
            "https://upload-host.example.com/upload/v1/store/abc123"
        );
        let crc = format!("{:08x}", crc32fast::hash(b"image-bytes"));
        assert!(recorded[1]
            .headers
            .iter()
            .any(|(n, v)| n == "Content-CRC32" && *v == crc));
        assert!(recorded[1]
            .headers
            .iter()
            .any(|(n, v)| n == "Authorization" && v == "store-auth"));

        // Commit: signed POST with the session key.
        assert!(recorded[2].url.contains("Action=CommitImageUpload"));
        assert!(String::from_utf8_lossy(&recorded[2].body).contains("sess-key"));
    }

    #[tokio::test]
    async fn test_commit_non_2000_uri_status_fails() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(apply_response());
        mock.push_json(json!({"code": 2000}));
        mock.push_json(commit_response(2001));

        let pipeline = UploadPipeline::new(mock);
        let err = pipeline
            .upload_one(&token(), &endpoints(), b"img".to_vec())
            .await
            .unwrap_err();

        match err {
            UploadError::CommitFailed { uri_status, .. } => assert_eq!(uri_status, 2001),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_status_error_is_auth_and_not_retried() {
        let mock = Arc::new(MockTransport::new());
        mock.push_err(TransportError::Status {
            status: 403,
            body: "signature mismatch".into(),
        });

        let pipeline = UploadPipeline::new(mock.clone());
        let err = pipeline
            .upload_one(&token(), &endpoints(), b"img".to_vec())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Auth(_)));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_bytes_retries_on_network_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(apply_response());
        mock.push_err(TransportError::Network("reset".into()));
        mock.push_json(json!({"code": 2000}));
        mock.push_json(commit_response(2000));

        let pipeline = UploadPipeline::new(mock.clone());
        let uri = pipeline
            .upload_one(&token(), &endpoints(), b"img".to_vec())
            .await
            .unwrap();

        assert_eq!(uri, "store/abc123");
        // apply + 2 push attempts + commit
        assert_eq!(mock.request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_bytes_gives_up_after_max_attempts() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(apply_response());
        for _ in 0..UPLOAD_MAX_ATTEMPTS {
            mock.push_err(TransportError::Timeout("slow".into()));
        }

        let pipeline = UploadPipeline::new(mock.clone());
        let err = pipeline
            .upload_one(&token(), &endpoints(), b"img".to_vec())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Timeout(_)));
        assert_eq!(mock.request_count(), 1 + UPLOAD_MAX_ATTEMPTS as usize);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_all_is_sequential_with_pacing() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..2 {
            mock.push_json(apply_response());
            mock.push_json(json!({"code": 2000}));
            mock.push_json(commit_response(2000));
        }

        let pipeline = UploadPipeline::new(mock.clone());
        let started = tokio::time::Instant::now();
        let uris = pipeline
            .upload_all(
                &token(),
                &endpoints(),
                &[
                    ImageSource::Bytes(b"one".to_vec()),
                    ImageSource::Bytes(b"two".to_vec()),
                ],
            )
            .await
            .unwrap();

        assert_eq!(uris.len(), 2);
        // Exactly one inter-upload pause for two uploads.
        assert_eq!(started.elapsed(), INTER_UPLOAD_PAUSE);
    }

    #[tokio::test]
    async fn test_upload_all_single_image_has_no_pause() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(apply_response());
        mock.push_json(json!({"code": 2000}));
        mock.push_json(commit_response(2000));

        let pipeline = UploadPipeline::new(mock.clone());
        let uris = pipeline
            .upload_all(&token(), &endpoints(), &[ImageSource::Bytes(b"one".to_vec())])
            .await
            .unwrap();
        assert_eq!(uris, vec!["store/abc123".to_string()]);
    }

    #[test]
    fn test_retry_delay_scales_with_attempt_and_kind() {
        let status = TransportError::Status {
            status: 500,
            body: String::new(),
        };
        let network = TransportError::Network("x".into());
        assert_eq!(retry_delay(1, &status), Duration::from_secs(2));
        assert_eq!(retry_delay(2, &status), Duration::from_secs(4));
        assert_eq!(retry_delay(1, &network), Duration::from_secs(3));
        assert_eq!(retry_delay(2, &network), Duration::from_secs(6));
    }
}
