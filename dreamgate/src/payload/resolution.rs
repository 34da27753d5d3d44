//! Pixel-dimension resolution.
//!
//! Maps the requested aspect ratio and resolution tier to concrete pixel
//! dimensions. Forced-resolution models short-circuit the computation;
//! degenerate ratios fall back to square output at the requested tier.

use super::models::ModelSpec;
use crate::credential::Region;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Generated edges are rounded to multiples of this.
const EDGE_MULTIPLE: u32 = 8;

/// Widest aspect accepted before the input is considered degenerate.
const MAX_ASPECT: f64 = 4.0;

/// Resolution tier of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionTier {
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2k")]
    K2,
}

impl ResolutionTier {
    /// Parses the wire form (`480p` | `720p` | `1080p` | `2k`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "480p" => Some(Self::P480),
            "720p" => Some(Self::P720),
            "1080p" => Some(Self::P1080),
            "2k" => Some(Self::K2),
            _ => None,
        }
    }

    /// Target pixel area for this tier (the area of the 16:9 reference
    /// frame; ratios redistribute it between the edges).
    fn target_area(&self) -> f64 {
        match self {
            Self::P480 => 854.0 * 480.0,
            Self::P720 => 1280.0 * 720.0,
            Self::P1080 => 1920.0 * 1080.0,
            Self::K2 => 2560.0 * 1440.0,
        }
    }

    /// Wire name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::K2 => "2k",
        }
    }
}

impl Default for ResolutionTier {
    fn default() -> Self {
        Self::P1080
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub tier: ResolutionTier,
    /// True when the model dictated the size regardless of the request.
    pub forced: bool,
}

/// Resolves pixel dimensions for a request.
///
/// Order of precedence:
/// 1. a forced model resolution for the region,
/// 2. the requested `W:H` ratio scaled to the tier's pixel area,
/// 3. square output at the tier for degenerate ratio inputs.
pub fn resolve_resolution(
    model: &ModelSpec,
    region: Region,
    ratio: &str,
    tier: ResolutionTier,
) -> Resolution {
    if let Some((width, height)) = model.forced_resolution(region) {
        return Resolution {
            width,
            height,
            tier,
            forced: true,
        };
    }

    let (ratio_w, ratio_h) = match parse_ratio(ratio) {
        Some(parsed) => parsed,
        None => {
            debug!(ratio = ratio, "Degenerate ratio, falling back to 1:1");
            (1, 1)
        }
    };

    let aspect = f64::from(ratio_w) / f64::from(ratio_h);
    let area = tier.target_area();
    let width = round_edge((area * aspect).sqrt());
    let height = round_edge((area / aspect).sqrt());

    Resolution {
        width,
        height,
        tier,
        forced: false,
    }
}

/// Parses `W:H` into positive integers with a sane aspect range.
fn parse_ratio(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once(':')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    let aspect = f64::from(w) / f64::from(h);
    if !(1.0 / MAX_ASPECT..=MAX_ASPECT).contains(&aspect) {
        return None;
    }
    Some((w, h))
}

fn round_edge(edge: f64) -> u32 {
    let rounded = (edge / f64::from(EDGE_MULTIPLE)).round() as u32 * EDGE_MULTIPLE;
    rounded.max(EDGE_MULTIPLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{resolve_model, ModelKind};

    fn free_model() -> &'static ModelSpec {
        resolve_model(ModelKind::Image, "jimeng-4.5", Region::Cn).unwrap()
    }

    fn forced_model() -> &'static ModelSpec {
        resolve_model(ModelKind::Image, "jimeng-2.1", Region::Cn).unwrap()
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!(ResolutionTier::parse("1080p"), Some(ResolutionTier::P1080));
        assert_eq!(ResolutionTier::parse("2K"), Some(ResolutionTier::K2));
        assert_eq!(ResolutionTier::parse(" 720p "), Some(ResolutionTier::P720));
        assert_eq!(ResolutionTier::parse("4k"), None);
    }

    #[test]
    fn test_sixteen_nine_at_1080p() {
        let res = resolve_resolution(free_model(), Region::Cn, "16:9", ResolutionTier::P1080);
        assert_eq!((res.width, res.height), (1920, 1080));
        assert!(!res.forced);

        // Ratio within 0.5% of 16:9.
        let actual = f64::from(res.width) / f64::from(res.height);
        assert!((actual - 16.0 / 9.0).abs() / (16.0 / 9.0) < 0.005);
    }

    #[test]
    fn test_square_at_1080p() {
        let res = resolve_resolution(free_model(), Region::Cn, "1:1", ResolutionTier::P1080);
        assert_eq!((res.width, res.height), (1440, 1440));
    }

    #[test]
    fn test_portrait_mirrors_landscape() {
        let landscape =
            resolve_resolution(free_model(), Region::Cn, "16:9", ResolutionTier::P720);
        let portrait = resolve_resolution(free_model(), Region::Cn, "9:16", ResolutionTier::P720);
        assert_eq!(landscape.width, portrait.height);
        assert_eq!(landscape.height, portrait.width);
    }

    #[test]
    fn test_edges_are_multiples_of_eight() {
        for ratio in ["16:9", "4:3", "3:2", "21:9", "2:3"] {
            for tier in [
                ResolutionTier::P480,
                ResolutionTier::P720,
                ResolutionTier::P1080,
                ResolutionTier::K2,
            ] {
                let res = resolve_resolution(free_model(), Region::Cn, ratio, tier);
                assert_eq!(res.width % EDGE_MULTIPLE, 0, "{ratio} {tier} width");
                assert_eq!(res.height % EDGE_MULTIPLE, 0, "{ratio} {tier} height");
            }
        }
    }

    #[test]
    fn test_forced_model_ignores_request() {
        let res = resolve_resolution(forced_model(), Region::Cn, "16:9", ResolutionTier::K2);
        assert_eq!((res.width, res.height), (1024, 1024));
        assert!(res.forced);
    }

    #[test]
    fn test_degenerate_ratio_falls_back_to_square() {
        for raw in ["", "16x9", "0:9", "16:0", "banana", "100:1"] {
            let res = resolve_resolution(free_model(), Region::Cn, raw, ResolutionTier::P1080);
            assert_eq!(res.width, res.height, "input {raw:?}");
            assert!(!res.forced);
        }
    }

    #[test]
    fn test_higher_tier_is_larger() {
        let low = resolve_resolution(free_model(), Region::Cn, "16:9", ResolutionTier::P480);
        let high = resolve_resolution(free_model(), Region::Cn, "16:9", ResolutionTier::K2);
        assert!(high.width > low.width);
        assert!(high.height > low.height);
    }
}
