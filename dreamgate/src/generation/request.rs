//! Request validation.
//!
//! Raw DTOs mirror the HTTP bodies with everything optional; `validate()`
//! turns them into fully-typed requests or one aggregated
//! `InvalidRequest` listing every problem at once.

use super::GenerateError;
use crate::payload::ResolutionTier;
use crate::upload::ImageSource;
use serde::Deserialize;

/// Longest accepted prompt, in characters.
const MAX_PROMPT_CHARS: usize = 6000;

/// Most input images accepted for a composition.
const MAX_COMPOSITION_IMAGES: usize = 4;

/// Accepted video duration range, in seconds.
const VIDEO_DURATION_RANGE: std::ops::RangeInclusive<u32> = 2..=10;

/// Validated text-to-image / multi-image request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub ratio: String,
    pub resolution: ResolutionTier,
    pub sample_strength: f64,
    pub seed: Option<u32>,
    pub intelligent_ratio: bool,
    /// Explicit multi-image count, when the client sent one.
    pub count: Option<u32>,
}

/// Validated image-composition request.
#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub image: ImageRequest,
    pub sources: Vec<ImageSource>,
}

/// Validated image-to-video request.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub ratio: String,
    pub resolution: ResolutionTier,
    pub duration_secs: u32,
    pub fps: u32,
    pub seed: Option<u32>,
    pub sources: Vec<ImageSource>,
}

/// Raw body of the image generation endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawImageRequest {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub ratio: Option<String>,
    pub resolution: Option<String>,
    pub sample_strength: Option<f64>,
    pub seed: Option<u32>,
    pub intelligent_ratio: Option<bool>,
    pub count: Option<u32>,
}

impl RawImageRequest {
    /// Validates into a typed request, aggregating all field errors.
    pub fn validate(self) -> Result<ImageRequest, GenerateError> {
        let mut problems = Vec::new();

        let prompt = required_prompt(&self.prompt, &mut problems);
        let resolution = parse_resolution(&self.resolution, &mut problems);
        let sample_strength = bounded_strength(self.sample_strength, &mut problems);
        if let Some(count) = self.count {
            if !(1..=8).contains(&count) {
                problems.push(format!("count must be 1-8, got {}", count));
            }
        }

        finish(problems)?;
        Ok(ImageRequest {
            model: self.model.unwrap_or_default(),
            prompt,
            negative_prompt: self.negative_prompt.unwrap_or_default(),
            ratio: self.ratio.unwrap_or_else(|| "1:1".to_string()),
            resolution,
            sample_strength,
            seed: self.seed,
            intelligent_ratio: self.intelligent_ratio.unwrap_or(false),
            count: self.count,
        })
    }
}

/// Raw body of the composition endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCompositionRequest {
    #[serde(flatten)]
    pub image: RawImageRequest,
    /// Input image references: data URIs or http(s) URLs.
    pub images: Vec<String>,
}

impl RawCompositionRequest {
    /// Validates into a typed request, aggregating all field errors.
    pub fn validate(self) -> Result<CompositionRequest, GenerateError> {
        let mut problems = Vec::new();

        if self.images.is_empty() {
            problems.push("at least one input image is required".to_string());
        }
        if self.images.len() > MAX_COMPOSITION_IMAGES {
            problems.push(format!(
                "at most {} input images are accepted, got {}",
                MAX_COMPOSITION_IMAGES,
                self.images.len()
            ));
        }

        let mut sources = Vec::with_capacity(self.images.len());
        for (index, reference) in self.images.iter().enumerate() {
            match ImageSource::from_reference(reference) {
                Ok(source) => sources.push(source),
                Err(e) => problems.push(format!("images[{}]: {}", index, e)),
            }
        }

        let image = match self.image.validate() {
            Ok(image) => Some(image),
            Err(GenerateError::InvalidRequest(msg)) => {
                problems.push(msg);
                None
            }
            Err(other) => return Err(other),
        };

        finish(problems)?;
        Ok(CompositionRequest {
            image: image.expect("no problems implies valid image request"),
            sources,
        })
    }
}

/// Raw body of the video generation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawVideoRequest {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub ratio: Option<String>,
    pub resolution: Option<String>,
    pub duration: Option<u32>,
    pub fps: Option<u32>,
    pub seed: Option<u32>,
    /// Optional first/end frame references.
    #[serde(alias = "file_paths")]
    pub images: Vec<String>,
}

impl RawVideoRequest {
    /// Validates into a typed request, aggregating all field errors.
    pub fn validate(self) -> Result<VideoRequest, GenerateError> {
        let mut problems = Vec::new();

        let prompt = required_prompt(&self.prompt, &mut problems);
        let resolution = parse_tier_or(&self.resolution, ResolutionTier::P720, &mut problems);

        let duration_secs = self.duration.unwrap_or(5);
        if !VIDEO_DURATION_RANGE.contains(&duration_secs) {
            problems.push(format!(
                "duration must be {}-{} seconds, got {}",
                VIDEO_DURATION_RANGE.start(),
                VIDEO_DURATION_RANGE.end(),
                duration_secs
            ));
        }

        let fps = self.fps.unwrap_or(24);
        if !(12..=60).contains(&fps) {
            problems.push(format!("fps must be 12-60, got {}", fps));
        }

        if self.images.len() > 2 {
            problems.push(format!(
                "a video takes at most a first and an end frame, got {} images",
                self.images.len()
            ));
        }
        let mut sources = Vec::with_capacity(self.images.len());
        for (index, reference) in self.images.iter().enumerate() {
            match ImageSource::from_reference(reference) {
                Ok(source) => sources.push(source),
                Err(e) => problems.push(format!("images[{}]: {}", index, e)),
            }
        }

        finish(problems)?;
        Ok(VideoRequest {
            model: self.model.unwrap_or_default(),
            prompt,
            ratio: self.ratio.unwrap_or_else(|| "16:9".to_string()),
            resolution,
            duration_secs,
            fps,
            seed: self.seed,
            sources,
        })
    }
}

fn required_prompt(prompt: &Option<String>, problems: &mut Vec<String>) -> String {
    let prompt = prompt.as_deref().unwrap_or("").trim().to_string();
    if prompt.is_empty() {
        problems.push("prompt is required".to_string());
    } else if prompt.chars().count() > MAX_PROMPT_CHARS {
        problems.push(format!(
            "prompt exceeds {} characters",
            MAX_PROMPT_CHARS
        ));
    }
    prompt
}

fn parse_resolution(raw: &Option<String>, problems: &mut Vec<String>) -> ResolutionTier {
    parse_tier_or(raw, ResolutionTier::default(), problems)
}

fn parse_tier_or(
    raw: &Option<String>,
    default: ResolutionTier,
    problems: &mut Vec<String>,
) -> ResolutionTier {
    match raw.as_deref() {
        None => default,
        Some(raw) => match ResolutionTier::parse(raw) {
            Some(tier) => tier,
            None => {
                problems.push(format!(
                    "resolution must be one of 480p/720p/1080p/2k, got '{}'",
                    raw
                ));
                default
            }
        },
    }
}

fn bounded_strength(raw: Option<f64>, problems: &mut Vec<String>) -> f64 {
    let strength = raw.unwrap_or(0.5);
    if !(0.0..=1.0).contains(&strength) {
        problems.push(format!("sample_strength must be 0.0-1.0, got {}", strength));
    }
    strength
}

fn finish(problems: Vec<String>) -> Result<(), GenerateError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(GenerateError::InvalidRequest(problems.join("; ")))
    }
}
