//! Authenticated client for the product API.
//!
//! Thin request/response layer over [`Transport`]: it owns the common
//! query parameters and cookie authentication, resolves the endpoint row
//! for the credential's region, and parses the `{ret, errmsg, data}`
//! envelopes. Orchestration (quota, uploads, polling) lives in
//! `generation::controller`.

use super::endpoints::{resolve_endpoints, ResolvedEndpoints};
use super::transport::Transport;
use super::types::{
    ApiEnvelope, GenerateResponse, HistoryMap, HistoryRecord, UploadToken, UploadTokenData,
};
use super::UpstreamError;
use crate::config::MirrorSettings;
use crate::credential::Credential;
use serde_json::json;
use tracing::debug;

/// Client for the draft-generate, history, and upload-token endpoints.
#[derive(Clone)]
pub struct UpstreamClient<T: Transport> {
    transport: T,
    mirrors: MirrorSettings,
}

impl<T: Transport> UpstreamClient<T> {
    /// Creates a client over a (typically shared) transport.
    pub fn new(transport: T, mirrors: MirrorSettings) -> Self {
        Self { transport, mirrors }
    }

    /// Resolves the endpoint row for a credential's region.
    pub fn endpoints_for(&self, credential: &Credential) -> ResolvedEndpoints {
        resolve_endpoints(credential.region(), &self.mirrors)
    }

    /// Submits a generation draft and returns the history record id.
    ///
    /// A response without `aigc_data.history_record_id` is a protocol
    /// error: nothing can be polled without the correlation id.
    pub async fn submit_generation(
        &self,
        credential: &Credential,
        payload: &serde_json::Value,
    ) -> Result<String, UpstreamError> {
        let endpoints = self.endpoints_for(credential);
        let url = format!(
            "{}/mweb/v1/aigc_draft/generate?{}",
            endpoints.api_base,
            common_query(&endpoints)
        );
        let cookie = session_cookie(credential);
        let body = payload.to_string();

        debug!(region = %endpoints.region, "Submitting generation draft");
        let response = self
            .transport
            .post_json(&url, &body, &[("Cookie", cookie.as_str())])
            .await?;

        let envelope: ApiEnvelope<GenerateResponse> = parse_json(&response)?;
        let data = envelope.into_data().map_err(UpstreamError::Protocol)?;
        data.aigc_data
            .and_then(|aigc| aigc.history_record_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UpstreamError::Protocol("missing history_record_id".to_string()))
    }

    /// Fetches the history record for a single generation.
    pub async fn get_history(
        &self,
        credential: &Credential,
        history_id: &str,
    ) -> Result<HistoryRecord, UpstreamError> {
        let endpoints = self.endpoints_for(credential);
        let url = format!(
            "{}/mweb/v1/get_history_by_ids?{}",
            endpoints.api_base,
            common_query(&endpoints)
        );
        let cookie = session_cookie(credential);
        let body = json!({
            "history_ids": [history_id],
            "image_info": {
                "width": 2048,
                "height": 2048,
                "format": "webp"
            }
        })
        .to_string();

        let response = self
            .transport
            .post_json(&url, &body, &[("Cookie", cookie.as_str())])
            .await?;

        let envelope: ApiEnvelope<HistoryMap> = parse_json(&response)?;
        let mut map = envelope.into_data().map_err(UpstreamError::Protocol)?;
        map.remove(history_id).ok_or_else(|| {
            UpstreamError::Protocol(format!("history record '{}' missing from response", history_id))
        })
    }

    /// Acquires temporary blob-store credentials scoped to AIGC image
    /// upload.
    pub async fn get_upload_token(
        &self,
        credential: &Credential,
    ) -> Result<UploadToken, UpstreamError> {
        let endpoints = self.endpoints_for(credential);
        let url = format!(
            "{}/mweb/v1/get_upload_token?{}",
            endpoints.api_base,
            common_query(&endpoints)
        );
        let cookie = session_cookie(credential);
        let body = json!({"scene": 2}).to_string();

        let response = self
            .transport
            .post_json(&url, &body, &[("Cookie", cookie.as_str())])
            .await?;

        let envelope: ApiEnvelope<UploadTokenData> = parse_json(&response)?;
        let token = envelope
            .into_data()
            .map_err(UpstreamError::Protocol)?
            .into_token();
        if token.access_key.is_empty() || token.secret_key.is_empty() {
            return Err(UpstreamError::Protocol(
                "upload token missing access credentials".to_string(),
            ));
        }
        Ok(token)
    }
}

/// Query string shared by all product API calls.
fn common_query(endpoints: &ResolvedEndpoints) -> String {
    format!(
        "aid={}&device_platform=web&region={}&web_version=6.6.0",
        endpoints.app_id,
        endpoints.region.as_str().to_ascii_uppercase()
    )
}

/// Cookie header authenticating the request with the refresh token.
fn session_cookie(credential: &Credential) -> String {
    format!("sessionid={}; sessionid_ss={}", credential.token(), credential.token())
}

fn parse_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, UpstreamError> {
    serde_json::from_slice(bytes)
        .map_err(|e| UpstreamError::Protocol(format!("malformed response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn client(mock: Arc<MockTransport>) -> UpstreamClient<Arc<MockTransport>> {
        UpstreamClient::new(mock, MirrorSettings::default())
    }

    fn cn_credential() -> Credential {
        Credential::parse("test-refresh-token")
    }

    #[tokio::test]
    async fn test_submit_generation_returns_history_id() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({
            "ret": "0", "errmsg": "",
            "data": {"aigc_data": {"history_record_id": "h-123"}}
        }));

        let id = client(mock.clone())
            .submit_generation(&cn_credential(), &json!({"submit_id": "s1"}))
            .await
            .unwrap();

        assert_eq!(id, "h-123");
        let recorded = mock.recorded();
        assert!(recorded[0].url.contains("/mweb/v1/aigc_draft/generate"));
        assert!(recorded[0].url.starts_with("https://jimeng.jianying.com"));
        assert!(recorded[0]
            .headers
            .iter()
            .any(|(n, v)| n == "Cookie" && v.contains("test-refresh-token")));
    }

    #[tokio::test]
    async fn test_submit_generation_missing_id_is_protocol_error() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({"ret": "0", "errmsg": "", "data": {"aigc_data": {}}}));

        let err = client(mock)
            .submit_generation(&cn_credential(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_submit_generation_nonzero_ret() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({"ret": "1015", "errmsg": "login expired"}));

        let err = client(mock)
            .submit_generation(&cn_credential(), &json!({}))
            .await
            .unwrap_err();
        match err {
            UpstreamError::Protocol(msg) => assert!(msg.contains("login expired")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_history_extracts_record() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({
            "ret": "0", "errmsg": "",
            "data": {"h-9": {"status": 50, "fail_code": 0, "item_list": [], "task": {"finish_time": 1700000000}}}
        }));

        let record = client(mock)
            .get_history(&cn_credential(), "h-9")
            .await
            .unwrap();
        assert_eq!(record.status, 50);
        assert_eq!(record.finish_time(), 1700000000);
    }

    #[tokio::test]
    async fn test_get_history_missing_record() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({"ret": "0", "errmsg": "", "data": {}}));

        let err = client(mock)
            .get_history(&cn_credential(), "h-9")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_get_upload_token() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({
            "ret": "0", "errmsg": "",
            "data": {
                "auth": {
                    "access_key_id": "AK",
                    "secret_access_key": "SK",
                    "session_token": "ST"
                },
                "service_id": "svc"
            }
        }));

        let token = client(mock.clone())
            .get_upload_token(&cn_credential())
            .await
            .unwrap();
        assert_eq!(token.access_key, "AK");
        assert_eq!(token.service_id.as_deref(), Some("svc"));
        assert!(mock.recorded()[0].url.contains("/mweb/v1/get_upload_token"));
    }

    #[tokio::test]
    async fn test_us_credential_uses_us_endpoints() {
        let mock = Arc::new(MockTransport::new());
        mock.push_json(json!({
            "ret": "0", "errmsg": "",
            "data": {"aigc_data": {"history_record_id": "h-1"}}
        }));

        let credential = Credential::parse("US:tok");
        client(mock.clone())
            .submit_generation(&credential, &json!({}))
            .await
            .unwrap();
        assert!(mock.recorded()[0]
            .url
            .starts_with("https://dreamina-us.capcut.com"));
    }
}
