//! Wire types for the upstream product API.
//!
//! The upstream wraps every response in `{ret, errmsg, data}` with `ret`
//! as a *string* code ("0" on success). History records are keyed by
//! history id and carry the generated artifacts in `item_list`.

use serde::de::Deserializer;
use serde::Deserialize;
use std::collections::HashMap;

/// History status value for a failed generation.
pub const HISTORY_STATUS_FAILED: i32 = 30;

/// History status value for a finished generation.
pub const HISTORY_STATUS_SUCCEEDED: i32 = 50;

/// Generic `{ret, errmsg, data}` envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub ret: String,
    #[serde(default)]
    pub errmsg: String,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwraps the payload, turning a non-zero `ret` into an error message.
    pub fn into_data(self) -> Result<T, String> {
        if self.ret != "0" {
            return Err(format!("ret={} errmsg={}", self.ret, self.errmsg));
        }
        self.data.ok_or_else(|| "missing data".to_string())
    }
}

/// Payload of `aigc_draft/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub aigc_data: Option<AigcData>,
}

#[derive(Debug, Deserialize)]
pub struct AigcData {
    #[serde(default)]
    pub history_record_id: Option<String>,
}

/// Map payload of `get_history_by_ids`: history id → record.
pub type HistoryMap = HashMap<String, HistoryRecord>;

/// One record from `get_history_by_ids`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub status: i32,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub fail_code: i64,
    #[serde(default)]
    pub item_list: Vec<ItemEntry>,
    #[serde(default)]
    pub task: Option<HistoryTask>,
}

impl HistoryRecord {
    /// Upstream finish timestamp, 0 while still generating.
    pub fn finish_time(&self) -> i64 {
        self.task.as_ref().map(|t| t.finish_time).unwrap_or(0)
    }
}

/// Task sub-object of a history record.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryTask {
    #[serde(default)]
    pub finish_time: i64,
}

/// One generated artifact in `item_list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemEntry {
    #[serde(default)]
    pub image: Option<ImageInfo>,
    #[serde(default)]
    pub video: Option<VideoInfo>,
    #[serde(default)]
    pub common_attr: Option<CommonAttr>,
}

impl ItemEntry {
    /// Extracts the best asset URL for this item.
    ///
    /// Preference order: full-size image, transcoded video, raw video URL,
    /// cover image. Returns `None` when the item carries no usable URL.
    pub fn asset_url(&self) -> Option<String> {
        if let Some(image) = &self.image {
            if let Some(url) = image
                .large_images
                .iter()
                .find_map(|img| img.image_url.clone())
            {
                return Some(url);
            }
        }
        if let Some(video) = &self.video {
            if let Some(url) = video
                .transcoded_video
                .as_ref()
                .and_then(|t| t.origin.as_ref())
                .and_then(|o| o.video_url.clone())
            {
                return Some(url);
            }
            if let Some(url) = video.video_url.clone() {
                return Some(url);
            }
        }
        self.common_attr
            .as_ref()
            .and_then(|attr| attr.cover_url.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageInfo {
    #[serde(default)]
    pub large_images: Vec<LargeImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LargeImage {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommonAttr {
    #[serde(default)]
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub transcoded_video: Option<TranscodedVideo>,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscodedVideo {
    #[serde(default)]
    pub origin: Option<OriginVideo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginVideo {
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Temporary credentials from `get_upload_token`, scoped to AIGC image
/// upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadToken {
    #[serde(alias = "access_key_id")]
    pub access_key: String,
    #[serde(alias = "secret_access_key")]
    pub secret_key: String,
    pub session_token: String,
    #[serde(default)]
    pub service_id: Option<String>,
}

/// Wrapper shape of the upload-token payload (`{auth: {...}, service_id}`).
#[derive(Debug, Deserialize)]
pub struct UploadTokenData {
    pub auth: UploadToken,
    #[serde(default)]
    pub service_id: Option<String>,
}

impl UploadTokenData {
    /// Flattens into a token, preferring the outer service id.
    pub fn into_token(self) -> UploadToken {
        let mut token = self.auth;
        if token.service_id.is_none() {
            token.service_id = self.service_id;
        }
        token
    }
}

/// The upstream sometimes serializes fail codes as strings ("2038").
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
        Null,
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(s) => Ok(s.trim().parse().unwrap_or(0)),
        Raw::Null => Ok(0),
    }
}
