//! The generation controller.
//!
//! One public operation per generation mode, each returning the asset
//! URLs of the finished generation. The step order is fixed: resolve
//! model → quota check → uploads → build payload → submit → poll →
//! extract → quota increment. Cancellation is observed between stages and
//! at every poll boundary.

use super::extract::extract_urls;
use super::request::{CompositionRequest, ImageRequest, VideoRequest};
use super::GenerateError;
use crate::config::{GenerationSettings, MirrorSettings};
use crate::credential::Credential;
use crate::payload::{
    self, build_img2img, build_img2video, build_multi_img, build_text2img, detect_multi_count,
    resolve_resolution, ModelKind, ImageInput, VideoInput,
};
use crate::poll::{PollConfig, PollKind, PollSnapshot, PollState, ProgressFn, SmartPoller};
use crate::quota::{QuotaLedger, ServiceKind};
use crate::upload::UploadPipeline;
use crate::upstream::{
    HistoryRecord, Transport, UpstreamClient, HISTORY_STATUS_FAILED, HISTORY_STATUS_SUCCEEDED,
};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Artifacts a plain text-to-image generation yields.
const TEXT2IMG_EXPECTED_ITEMS: usize = 4;

/// Per-run control handles: cancellation plus optional progress sink.
pub struct RunControl {
    pub cancel: CancellationToken,
    pub progress: Option<ProgressFn>,
}

impl RunControl {
    /// Control with a fresh token and no progress reporting.
    pub fn detached() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: None,
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::detached()
    }
}

/// Orchestrates generations against the upstream.
pub struct GenerationController<T: Transport + Clone> {
    upstream: UpstreamClient<T>,
    uploader: UploadPipeline<T>,
    ledger: Arc<QuotaLedger>,
    settings: GenerationSettings,
}

impl<T: Transport + Clone> GenerationController<T> {
    /// Wires the controller over a shared transport and ledger.
    pub fn new(
        transport: T,
        mirrors: MirrorSettings,
        ledger: Arc<QuotaLedger>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            upstream: UpstreamClient::new(transport.clone(), mirrors),
            uploader: UploadPipeline::new(transport),
            ledger,
            settings,
        }
    }

    /// Text-to-image (and multi-image) generation.
    pub async fn generate_image(
        &self,
        request: &ImageRequest,
        credential: &Credential,
        control: RunControl,
    ) -> Result<Vec<String>, GenerateError> {
        let region = credential.region();
        let session = credential.session_id();
        let model = payload::resolve_model(ModelKind::Image, &request.model, region)?;

        self.check_quota(&session, ServiceKind::Image).await?;

        let resolution = resolve_resolution(model, region, &request.ratio, request.resolution);
        let submit_id = Uuid::new_v4().to_string();
        let component_id = Uuid::new_v4().to_string();
        let endpoints = self.upstream.endpoints_for(credential);
        let input = ImageInput {
            model_code: model.code,
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            resolution,
            sample_strength: request.sample_strength,
            seed: request.seed.unwrap_or_else(random_seed),
            submit_id: &submit_id,
            component_id: &component_id,
            intelligent_ratio: request.intelligent_ratio,
            app_id: &endpoints.app_id,
        };

        let multi = detect_multi_count(&request.prompt, request.count);
        let (envelope, expected_items) = match multi {
            Some(count) => (build_multi_img(&input, count), count as usize),
            None => (build_text2img(&input), TEXT2IMG_EXPECTED_ITEMS),
        };

        let urls = self
            .run_generation(credential, &envelope, expected_items, PollKind::Image, control)
            .await?;
        self.record_usage(&session, ServiceKind::Image).await;
        Ok(urls)
    }

    /// Image composition over uploaded input images.
    pub async fn generate_image_composition(
        &self,
        request: &CompositionRequest,
        credential: &Credential,
        control: RunControl,
    ) -> Result<Vec<String>, GenerateError> {
        let region = credential.region();
        let session = credential.session_id();
        let model = payload::resolve_model(ModelKind::Image, &request.image.model, region)?;

        self.check_quota(&session, ServiceKind::Image).await?;

        let endpoints = self.upstream.endpoints_for(credential);
        let token = self.upstream.get_upload_token(credential).await?;
        let uploaded = self
            .uploader
            .upload_all(&token, &endpoints, &request.sources)
            .await?;
        if control.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let resolution = resolve_resolution(
            model,
            region,
            &request.image.ratio,
            request.image.resolution,
        );
        let submit_id = Uuid::new_v4().to_string();
        let component_id = Uuid::new_v4().to_string();
        let input = ImageInput {
            model_code: model.code,
            prompt: &request.image.prompt,
            negative_prompt: &request.image.negative_prompt,
            resolution,
            sample_strength: request.image.sample_strength,
            seed: request.image.seed.unwrap_or_else(random_seed),
            submit_id: &submit_id,
            component_id: &component_id,
            intelligent_ratio: request.image.intelligent_ratio,
            app_id: &endpoints.app_id,
        };
        let envelope = build_img2img(&input, &uploaded);

        let urls = self
            .run_generation(credential, &envelope, 1, PollKind::Image, control)
            .await?;
        self.record_usage(&session, ServiceKind::Image).await;
        Ok(urls)
    }

    /// Image-to-video generation.
    pub async fn generate_video(
        &self,
        request: &VideoRequest,
        credential: &Credential,
        control: RunControl,
    ) -> Result<Vec<String>, GenerateError> {
        let region = credential.region();
        let session = credential.session_id();
        let model = payload::resolve_model(ModelKind::Video, &request.model, region)?;

        self.check_quota(&session, ServiceKind::Video).await?;

        let endpoints = self.upstream.endpoints_for(credential);
        let uploaded = if request.sources.is_empty() {
            Vec::new()
        } else {
            let token = self.upstream.get_upload_token(credential).await?;
            self.uploader
                .upload_all(&token, &endpoints, &request.sources)
                .await?
        };
        if control.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let resolution = resolve_resolution(model, region, &request.ratio, request.resolution);
        let submit_id = Uuid::new_v4().to_string();
        let component_id = Uuid::new_v4().to_string();
        let input = VideoInput {
            model_code: model.code,
            prompt: &request.prompt,
            resolution,
            duration_secs: request.duration_secs,
            fps: request.fps,
            seed: request.seed.unwrap_or_else(random_seed),
            submit_id: &submit_id,
            component_id: &component_id,
            first_frame_uri: uploaded.first().map(String::as_str),
            end_frame_uri: uploaded.get(1).map(String::as_str),
            app_id: &endpoints.app_id,
        };
        let envelope = build_img2video(&input);

        let urls = self
            .run_generation(credential, &envelope, 1, PollKind::Video, control)
            .await?;
        self.record_usage(&session, ServiceKind::Video).await;
        Ok(urls)
    }

    /// Shared submit → poll → extract tail of every operation.
    async fn run_generation(
        &self,
        credential: &Credential,
        envelope: &serde_json::Value,
        expected_items: usize,
        kind: PollKind,
        control: RunControl,
    ) -> Result<Vec<String>, GenerateError> {
        if control.cancel.is_cancelled() {
            return Err(GenerateError::Cancelled);
        }

        let started = Instant::now();
        let history_id = self.upstream.submit_generation(credential, envelope).await?;
        info!(history_id = %history_id, "Generation submitted");

        let max_polls = match kind {
            PollKind::Image => self.settings.image_max_polls,
            PollKind::Video => self.settings.video_max_polls,
        };
        let mut poller = SmartPoller::new(PollConfig {
            kind,
            expected_items,
            max_polls,
            deadline: poll_deadline(kind, max_polls),
        });
        if let Some(progress) = control.progress {
            poller = poller.with_progress(progress);
        }

        let upstream = &self.upstream;
        let history_id_ref = &history_id;
        let output = poller
            .run(&control.cancel, move || async move {
                let record = upstream.get_history(credential, history_id_ref).await?;
                Ok(to_snapshot(history_id_ref, record))
            })
            .await?;

        let urls = extract_urls(&output.data)?;
        info!(
            history_id = %history_id,
            urls = urls.len(),
            polls = output.summary.poll_count,
            latency_ms = started.elapsed().as_millis() as u64,
            "Generation finished"
        );
        Ok(urls)
    }

    /// Pre-flight quota check; denial never reaches the upstream.
    async fn check_quota(&self, session: &str, service: ServiceKind) -> Result<(), GenerateError> {
        let decision = self.ledger.check(session, service).await;
        if !decision.allowed {
            return Err(GenerateError::Quota(crate::quota::QuotaError::Exceeded {
                service,
                current: decision.current,
                limit: decision.limit,
            }));
        }
        Ok(())
    }

    /// Increment-after-success. A bookkeeping failure is logged and
    /// swallowed: the user already holds the result, and an under-count
    /// beats failing a finished generation.
    async fn record_usage(&self, session: &str, service: ServiceKind) {
        if let Err(e) = self.ledger.increment(session, service).await {
            warn!(session = session, service = %service, error = %e, "Usage increment failed after success");
        }
    }
}

/// Maps a history record onto the poller's snapshot shape.
fn to_snapshot(history_id: &str, record: HistoryRecord) -> PollSnapshot<HistoryRecord> {
    let state = match record.status {
        HISTORY_STATUS_SUCCEEDED => PollState::Succeeded,
        HISTORY_STATUS_FAILED => PollState::Failed,
        _ => PollState::InProgress,
    };
    PollSnapshot {
        state,
        fail_code: record.fail_code,
        item_count: record.item_list.len(),
        finish_time: record.finish_time(),
        correlation_id: history_id.to_string(),
        data: record,
    }
}

/// Hard wall deadline: the poll budget times the base interval.
fn poll_deadline(kind: PollKind, max_polls: u32) -> Duration {
    let base_secs = match kind {
        PollKind::Image => 2,
        PollKind::Video => 5,
    };
    Duration::from_secs(u64::from(max_polls) * base_secs)
}

fn random_seed() -> u32 {
    rand::thread_rng().gen_range(0..100_000_000)
}
