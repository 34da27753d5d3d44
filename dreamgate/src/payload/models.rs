//! Model table: user-facing names, upstream codes, region availability.
//!
//! The user-facing names are stable API surface; the upstream codes are
//! what the draft envelopes carry. Availability and forced resolutions
//! vary per region. Additions extend the tables below.

use super::PayloadError;
use crate::credential::Region;

/// Whether a model generates images or videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Image,
    Video,
}

/// One row of the model table.
#[derive(Debug)]
pub struct ModelSpec {
    /// User-facing model name.
    pub name: &'static str,
    /// Upstream model code carried in `core_param`.
    pub code: &'static str,
    pub kind: ModelKind,
    /// Regions where the upstream serves this model.
    pub regions: &'static [Region],
    /// Regions where the model ignores the requested size, with the size
    /// it forces.
    pub forced_resolutions: &'static [(Region, u32, u32)],
}

impl ModelSpec {
    /// True if the model is served in `region`.
    pub fn available_in(&self, region: Region) -> bool {
        self.regions.contains(&region)
    }

    /// Forced output size for `region`, if any.
    pub fn forced_resolution(&self, region: Region) -> Option<(u32, u32)> {
        self.forced_resolutions
            .iter()
            .find(|(r, _, _)| *r == region)
            .map(|(_, w, h)| (*w, *h))
    }
}

const ALL_REGIONS: &[Region] = &[Region::Cn, Region::Us, Region::Hk];
const CN_ONLY: &[Region] = &[Region::Cn];
const OVERSEAS: &[Region] = &[Region::Us, Region::Hk];

/// Image model table.
static IMAGE_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "jimeng-4.5",
        code: "high_aes_general_v45:general_v4.5_pixel",
        kind: ModelKind::Image,
        regions: ALL_REGIONS,
        forced_resolutions: &[],
    },
    ModelSpec {
        name: "jimeng-4.0",
        code: "high_aes_general_v40:general_v4.0_18b",
        kind: ModelKind::Image,
        regions: ALL_REGIONS,
        forced_resolutions: &[],
    },
    ModelSpec {
        name: "jimeng-3.1",
        code: "high_aes_general_v31:general_v3.1_18b",
        kind: ModelKind::Image,
        regions: CN_ONLY,
        forced_resolutions: &[],
    },
    ModelSpec {
        name: "jimeng-2.1",
        code: "high_aes_general_v21_L:general_v2.1_L",
        kind: ModelKind::Image,
        regions: CN_ONLY,
        // The v2.1 generator only emits square output.
        forced_resolutions: &[(Region::Cn, 1024, 1024)],
    },
    ModelSpec {
        name: "dreamina-3.5",
        code: "high_aes_general_v35_dreamina:general_v3.5",
        kind: ModelKind::Image,
        regions: OVERSEAS,
        forced_resolutions: &[(Region::Hk, 1024, 1024)],
    },
];

/// Video model table.
static VIDEO_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "jimeng-video-3.0",
        code: "dreamina_ic_generate_video_model_vgfm_3.0",
        kind: ModelKind::Video,
        regions: ALL_REGIONS,
        forced_resolutions: &[],
    },
    ModelSpec {
        name: "jimeng-video-2.0-pro",
        code: "dreamina_ic_generate_video_model_vgfm1.0",
        kind: ModelKind::Video,
        regions: CN_ONLY,
        forced_resolutions: &[],
    },
    ModelSpec {
        name: "jimeng-video-2.0",
        code: "dreamina_ic_generate_video_model_vgfm_lite",
        kind: ModelKind::Video,
        regions: CN_ONLY,
        forced_resolutions: &[],
    },
];

/// Default image model name per region.
pub fn default_image_model(region: Region) -> &'static str {
    match region {
        Region::Cn => "jimeng-4.5",
        Region::Us | Region::Hk => "dreamina-3.5",
    }
}

/// Default video model name per region.
pub fn default_video_model(_region: Region) -> &'static str {
    "jimeng-video-3.0"
}

fn table(kind: ModelKind) -> &'static [ModelSpec] {
    match kind {
        ModelKind::Image => IMAGE_MODELS,
        ModelKind::Video => VIDEO_MODELS,
    }
}

fn find(kind: ModelKind, name: &str) -> Option<&'static ModelSpec> {
    table(kind).iter().find(|spec| spec.name == name)
}

fn default_name(kind: ModelKind, region: Region) -> &'static str {
    match kind {
        ModelKind::Image => default_image_model(region),
        ModelKind::Video => default_video_model(region),
    }
}

/// Resolves a user-facing model name for a region.
///
/// An unset name resolves to the region default. A known model that is
/// unavailable in `region` is substituted with the region default when it
/// is the default of some *other* region (the user asked for "the default"
/// of the wrong deployment); any other name, including one not in the
/// table at all, is an error.
pub fn resolve_model(
    kind: ModelKind,
    name: &str,
    region: Region,
) -> Result<&'static ModelSpec, PayloadError> {
    let name = name.trim();
    if name.is_empty() {
        let fallback = default_name(kind, region);
        return Ok(find(kind, fallback).expect("default model exists"));
    }

    let Some(spec) = find(kind, name) else {
        return Err(PayloadError::UnsupportedModel {
            model: name.to_string(),
            region,
        });
    };

    if spec.available_in(region) {
        return Ok(spec);
    }

    let is_foreign_default = [Region::Cn, Region::Us, Region::Hk]
        .iter()
        .any(|r| *r != region && default_name(kind, *r) == spec.name);
    if is_foreign_default {
        let fallback = default_name(kind, region);
        return Ok(find(kind, fallback).expect("default model exists"));
    }

    Err(PayloadError::UnsupportedModel {
        model: name.to_string(),
        region,
    })
}

/// Lists the user-facing model names served in `region`.
pub fn list_models(region: Region) -> Vec<&'static ModelSpec> {
    IMAGE_MODELS
        .iter()
        .chain(VIDEO_MODELS.iter())
        .filter(|spec| spec.available_in(region))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_model_in_region() {
        let spec = resolve_model(ModelKind::Image, "jimeng-4.5", Region::Cn).unwrap();
        assert_eq!(spec.code, "high_aes_general_v45:general_v4.5_pixel");
    }

    #[test]
    fn test_unset_name_falls_back_to_region_default() {
        let spec = resolve_model(ModelKind::Image, "", Region::Us).unwrap();
        assert_eq!(spec.name, "dreamina-3.5");

        let spec = resolve_model(ModelKind::Image, "  ", Region::Cn).unwrap();
        assert_eq!(spec.name, "jimeng-4.5");
    }

    #[test]
    fn test_unknown_name_is_unsupported() {
        let err = resolve_model(ModelKind::Image, "jimeng-9.9", Region::Cn).unwrap_err();
        match err {
            PayloadError::UnsupportedModel { model, region } => {
                assert_eq!(model, "jimeng-9.9");
                assert_eq!(region, Region::Cn);
            }
        }
    }

    #[test]
    fn test_foreign_default_is_substituted() {
        // dreamina-3.5 is the US/HK default and unavailable in CN: the CN
        // default is substituted instead of erroring.
        let spec = resolve_model(ModelKind::Image, "dreamina-3.5", Region::Cn).unwrap();
        assert_eq!(spec.name, "jimeng-4.5");

        // jimeng-4.5 is the CN default but also served overseas, so no
        // substitution happens there.
        let spec = resolve_model(ModelKind::Image, "jimeng-4.5", Region::Us).unwrap();
        assert_eq!(spec.name, "jimeng-4.5");
    }

    #[test]
    fn test_unavailable_non_default_model_errors() {
        let err = resolve_model(ModelKind::Image, "jimeng-3.1", Region::Us).unwrap_err();
        match err {
            PayloadError::UnsupportedModel { model, region } => {
                assert_eq!(model, "jimeng-3.1");
                assert_eq!(region, Region::Us);
            }
        }
    }

    #[test]
    fn test_video_models_resolve_separately() {
        let spec = resolve_model(ModelKind::Video, "jimeng-video-3.0", Region::Us).unwrap();
        assert_eq!(spec.kind, ModelKind::Video);

        let err = resolve_model(ModelKind::Video, "jimeng-video-2.0", Region::Us).unwrap_err();
        assert!(matches!(err, PayloadError::UnsupportedModel { .. }));
    }

    #[test]
    fn test_forced_resolution_lookup() {
        let spec = find(ModelKind::Image, "jimeng-2.1").unwrap();
        assert_eq!(spec.forced_resolution(Region::Cn), Some((1024, 1024)));

        let spec = find(ModelKind::Image, "jimeng-4.5").unwrap();
        assert_eq!(spec.forced_resolution(Region::Cn), None);

        let spec = find(ModelKind::Image, "dreamina-3.5").unwrap();
        assert_eq!(spec.forced_resolution(Region::Hk), Some((1024, 1024)));
        assert_eq!(spec.forced_resolution(Region::Us), None);
    }

    #[test]
    fn test_list_models_filters_by_region() {
        let cn: Vec<_> = list_models(Region::Cn).iter().map(|s| s.name).collect();
        assert!(cn.contains(&"jimeng-3.1"));
        assert!(!cn.contains(&"dreamina-3.5"));

        let us: Vec<_> = list_models(Region::Us).iter().map(|s| s.name).collect();
        assert!(us.contains(&"dreamina-3.5"));
        assert!(!us.contains(&"jimeng-2.1"));
    }
}
