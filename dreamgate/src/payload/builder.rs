//! Generation envelope construction.
//!
//! One builder per mode. The upstream expects the component tree
//! (`draft_content`) and the telemetry envelope (`metrics_extra`) as JSON
//! *strings* inside the outer envelope. All node ids are derived from the
//! caller-supplied component id, so a builder call is fully deterministic
//! given its inputs.

use super::resolution::Resolution;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Telemetry scene for single image generation.
pub const SCENE_IMAGE_BASIC: &str = "ImageBasicGenerate";

/// Telemetry scene for multi-image generation.
pub const SCENE_IMAGE_MULTI: &str = "ImageMultiGenerate";

/// Telemetry scene for image blending (composition).
pub const SCENE_IMAGE_BLEND: &str = "ImageBlendGenerate";

/// Telemetry scene for video generation.
pub const SCENE_VIDEO: &str = "VideoGenerate";

/// Draft schema version the envelopes declare.
const DRAFT_VERSION: &str = "3.2.9";

/// Minimum client version the draft schema requires.
const DRAFT_MIN_VERSION: &str = "3.0.2";

/// Upper bound for the multi-image target count.
const MAX_MULTI_COUNT: u32 = 8;

/// Inputs for the image builders.
#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub model_code: &'a str,
    pub prompt: &'a str,
    pub negative_prompt: &'a str,
    pub resolution: Resolution,
    pub sample_strength: f64,
    pub seed: u32,
    pub submit_id: &'a str,
    pub component_id: &'a str,
    pub intelligent_ratio: bool,
    pub app_id: &'a str,
}

/// Inputs for the video builder.
#[derive(Debug, Clone, Copy)]
pub struct VideoInput<'a> {
    pub model_code: &'a str,
    pub prompt: &'a str,
    pub resolution: Resolution,
    pub duration_secs: u32,
    pub fps: u32,
    pub seed: u32,
    pub submit_id: &'a str,
    pub component_id: &'a str,
    pub first_frame_uri: Option<&'a str>,
    pub end_frame_uri: Option<&'a str>,
    pub app_id: &'a str,
}

/// Builds the text-to-image envelope.
pub fn build_text2img(input: &ImageInput<'_>) -> serde_json::Value {
    build_image_envelope(input, SCENE_IMAGE_BASIC, 1, &[])
}

/// Builds the multi-image envelope (text-to-image with a target count).
pub fn build_multi_img(input: &ImageInput<'_>, count: u32) -> serde_json::Value {
    build_image_envelope(input, SCENE_IMAGE_MULTI, count.clamp(2, MAX_MULTI_COUNT), &[])
}

/// Builds the image-blend envelope over N uploaded input images.
pub fn build_img2img(input: &ImageInput<'_>, image_uris: &[String]) -> serde_json::Value {
    build_image_envelope(input, SCENE_IMAGE_BLEND, 1, image_uris)
}

fn build_image_envelope(
    input: &ImageInput<'_>,
    scene: &'static str,
    generate_count: u32,
    image_uris: &[String],
) -> serde_json::Value {
    let blend = !image_uris.is_empty();
    let core_param = CoreParam {
        kind: "",
        id: node_id(input.component_id, "core_param"),
        model: input.model_code,
        prompt: input.prompt,
        negative_prompt: input.negative_prompt,
        seed: input.seed,
        sample_strength: input.sample_strength,
        intelligent_ratio: input.intelligent_ratio,
        large_image_info: LargeImageInfo {
            kind: "",
            id: node_id(input.component_id, "large_image_info"),
            width: input.resolution.width,
            height: input.resolution.height,
            resolution_type: input.resolution.tier.as_str(),
        },
    };

    let ability_name = if blend { "blend" } else { "generate" };
    let ability = GenerateAbility {
        kind: "",
        id: node_id(input.component_id, ability_name),
        core_param,
        ability_list: image_uris
            .iter()
            .enumerate()
            .map(|(index, uri)| AbilityImageRef {
                kind: "",
                id: node_id(input.component_id, &format!("image_ref_{}", index)),
                name: "image_ref",
                image_uri: uri,
                strength: input.sample_strength,
            })
            .collect(),
        prompt_placeholder_info_list: image_uris
            .iter()
            .enumerate()
            .map(|(index, _)| PromptPlaceholder {
                kind: "",
                id: node_id(input.component_id, &format!("placeholder_{}", index)),
                ability_index: index as u32,
            })
            .collect(),
        postedit_param: PosteditParam {
            kind: "",
            id: node_id(input.component_id, "postedit"),
            generate_type: 0,
        },
    };

    let draft = DraftContent {
        kind: "draft",
        id: node_id(input.component_id, "draft"),
        min_version: DRAFT_MIN_VERSION,
        min_features: &[],
        is_from_tsn: true,
        version: DRAFT_VERSION,
        main_component_id: input.component_id,
        component_list: vec![Component {
            kind: "image_base_component",
            id: input.component_id,
            min_version: DRAFT_MIN_VERSION,
            generate_type: if blend { "blend" } else { "generate" },
            aigc_mode: "workbench",
            abilities: Abilities {
                kind: "",
                id: node_id(input.component_id, "abilities"),
                generate: if blend { None } else { Some(ability.clone()) },
                blend: if blend { Some(ability) } else { None },
                gen_video: None,
            },
        }],
    };

    let strengths: Vec<f64> = if blend {
        image_uris.iter().map(|_| input.sample_strength).collect()
    } else {
        vec![input.sample_strength]
    };
    let metrics = MetricsExtra {
        scene,
        submit_id: input.submit_id,
        resolution_type: input.resolution.tier.as_str(),
        is_regenerate: false,
        template_id: "",
        generate_count,
        ability_strengths: strengths,
    };

    envelope(input.model_code, input.submit_id, input.app_id, &draft, &metrics)
}

/// Builds the image-to-video envelope.
pub fn build_img2video(input: &VideoInput<'_>) -> serde_json::Value {
    let duration_ms = input.duration_secs * 1000;
    let gen_video = GenVideoAbility {
        kind: "",
        id: node_id(input.component_id, "gen_video"),
        video_gen_inputs: vec![VideoGenInput {
            kind: "",
            id: node_id(input.component_id, "video_gen_input"),
            prompt: input.prompt,
            video_mode: 2,
            fps: input.fps,
            duration_ms,
            resolution: input.resolution.tier.as_str(),
            first_frame_image: input.first_frame_uri.map(|uri| FrameImage {
                kind: "image",
                id: node_id(input.component_id, "first_frame"),
                source_from: "upload",
                image_uri: uri,
            }),
            end_frame_image: input.end_frame_uri.map(|uri| FrameImage {
                kind: "image",
                id: node_id(input.component_id, "end_frame"),
                source_from: "upload",
                image_uri: uri,
            }),
        }],
        video_task_extra: VideoTaskExtra {
            model: input.model_code,
            seed: input.seed,
        },
        postedit_param: PosteditParam {
            kind: "",
            id: node_id(input.component_id, "postedit"),
            generate_type: 0,
        },
    };

    let draft = DraftContent {
        kind: "draft",
        id: node_id(input.component_id, "draft"),
        min_version: DRAFT_MIN_VERSION,
        min_features: &[],
        is_from_tsn: true,
        version: DRAFT_VERSION,
        main_component_id: input.component_id,
        component_list: vec![Component {
            kind: "video_base_component",
            id: input.component_id,
            min_version: DRAFT_MIN_VERSION,
            generate_type: "gen_video",
            aigc_mode: "workbench",
            abilities: Abilities {
                kind: "",
                id: node_id(input.component_id, "abilities"),
                generate: None,
                blend: None,
                gen_video: Some(gen_video),
            },
        }],
    };

    let metrics = MetricsExtra {
        scene: SCENE_VIDEO,
        submit_id: input.submit_id,
        resolution_type: input.resolution.tier.as_str(),
        is_regenerate: false,
        template_id: "",
        generate_count: 1,
        ability_strengths: Vec::new(),
    };

    envelope(input.model_code, input.submit_id, input.app_id, &draft, &metrics)
}

/// Detects multi-image intent.
///
/// An explicit `count` on the request wins. The legacy prompt heuristic
/// (`N张`, "N sheets") is kept as a fallback for older clients and is
/// deprecated in the API docs. Returns `None` for single-image requests.
pub fn detect_multi_count(prompt: &str, explicit: Option<u32>) -> Option<u32> {
    if let Some(count) = explicit {
        return (count > 1).then(|| count.min(MAX_MULTI_COUNT));
    }

    static COUNT_RE: OnceLock<Regex> = OnceLock::new();
    let re = COUNT_RE.get_or_init(|| Regex::new(r"(\d+)\s*张").expect("static regex compiles"));
    let count: u32 = re
        .captures(prompt)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    (count > 1).then(|| count.min(MAX_MULTI_COUNT))
}

/// Assembles the outer envelope, stringifying the draft and metrics.
fn envelope(
    model_code: &str,
    submit_id: &str,
    app_id: &str,
    draft: &DraftContent<'_>,
    metrics: &MetricsExtra<'_>,
) -> serde_json::Value {
    serde_json::json!({
        "extend": {
            "root_model": model_code,
            "template_id": "",
        },
        "submit_id": submit_id,
        "metrics_extra": serde_json::to_string(metrics).expect("metrics serialize"),
        "draft_content": serde_json::to_string(draft).expect("draft serialize"),
        "http_common_info": {
            "aid": app_id,
        },
    })
}

/// Derives a stable child node id.
fn node_id(component_id: &str, label: &str) -> String {
    format!("{}-{}", component_id, label)
}

// Component tree wire types. `type` is a reserved word, hence `kind`.

#[derive(Serialize)]
struct DraftContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    min_version: &'static str,
    min_features: &'static [&'static str],
    is_from_tsn: bool,
    version: &'static str,
    main_component_id: &'a str,
    component_list: Vec<Component<'a>>,
}

#[derive(Serialize)]
struct Component<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
    min_version: &'static str,
    generate_type: &'static str,
    aigc_mode: &'static str,
    abilities: Abilities<'a>,
}

#[derive(Serialize)]
struct Abilities<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    generate: Option<GenerateAbility<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blend: Option<GenerateAbility<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gen_video: Option<GenVideoAbility<'a>>,
}

#[derive(Serialize, Clone)]
struct GenerateAbility<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    core_param: CoreParam<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ability_list: Vec<AbilityImageRef<'a>>,
    prompt_placeholder_info_list: Vec<PromptPlaceholder>,
    postedit_param: PosteditParam,
}

#[derive(Serialize, Clone)]
struct CoreParam<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    model: &'a str,
    prompt: &'a str,
    negative_prompt: &'a str,
    seed: u32,
    sample_strength: f64,
    intelligent_ratio: bool,
    large_image_info: LargeImageInfo,
}

#[derive(Serialize, Clone)]
struct LargeImageInfo {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    width: u32,
    height: u32,
    resolution_type: &'static str,
}

#[derive(Serialize, Clone)]
struct AbilityImageRef<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    name: &'static str,
    image_uri: &'a str,
    strength: f64,
}

#[derive(Serialize, Clone)]
struct PromptPlaceholder {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    ability_index: u32,
}

#[derive(Serialize, Clone)]
struct PosteditParam {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    generate_type: u32,
}

#[derive(Serialize)]
struct GenVideoAbility<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    video_gen_inputs: Vec<VideoGenInput<'a>>,
    video_task_extra: VideoTaskExtra<'a>,
    postedit_param: PosteditParam,
}

#[derive(Serialize)]
struct VideoGenInput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    prompt: &'a str,
    video_mode: u32,
    fps: u32,
    duration_ms: u32,
    resolution: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_frame_image: Option<FrameImage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_frame_image: Option<FrameImage<'a>>,
}

#[derive(Serialize)]
struct FrameImage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    source_from: &'static str,
    image_uri: &'a str,
}

#[derive(Serialize)]
struct VideoTaskExtra<'a> {
    model: &'a str,
    seed: u32,
}

#[derive(Serialize)]
struct MetricsExtra<'a> {
    scene: &'static str,
    submit_id: &'a str,
    resolution_type: &'static str,
    is_regenerate: bool,
    template_id: &'static str,
    generate_count: u32,
    ability_strengths: Vec<f64>,
}
