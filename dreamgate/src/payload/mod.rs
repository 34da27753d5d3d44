//! Upstream request payload construction.
//!
//! Pure functions from typed inputs to the generation envelopes the
//! upstream expects. One envelope shape per mode; no ad-hoc JSON assembly
//! anywhere else. Model resolution and the pixel-dimension rules live in
//! their own submodules.

mod builder;
mod models;
mod resolution;

pub use builder::{
    build_img2img, build_img2video, build_multi_img, build_text2img, detect_multi_count,
    ImageInput, VideoInput, SCENE_IMAGE_BASIC, SCENE_IMAGE_BLEND, SCENE_IMAGE_MULTI, SCENE_VIDEO,
};
pub use models::{
    default_image_model, default_video_model, list_models, resolve_model, ModelKind, ModelSpec,
};
pub use resolution::{resolve_resolution, Resolution, ResolutionTier};

use crate::credential::Region;
use thiserror::Error;

/// Errors from payload construction.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Model not available in the credential's region and not substitutable.
    #[error("model '{model}' is not supported in region {region}")]
    UnsupportedModel { model: String, region: Region },
}
