//! Region endpoint table.
//!
//! Each deployment region uses its own product API host, blob-store control
//! endpoint, SigV4 signing region, referring origin, and imagex service id.
//! Mirror settings substitute individual base URLs without touching the
//! rest of the row; new regions extend the table.

use crate::config::MirrorSettings;
use crate::credential::Region;

/// Built-in endpoint row for one region.
#[derive(Debug, Clone, Copy)]
pub struct RegionEndpoints {
    /// Product API base (draft generate, history, upload token).
    pub api_base: &'static str,
    /// Blob-store control endpoint (ApplyImageUpload / CommitImageUpload).
    pub imagex_base: &'static str,
    /// Commerce endpoint for credit queries, where the region has one.
    pub commerce_base: Option<&'static str>,
    /// SigV4 signing region name.
    pub aws_region: &'static str,
    /// Referring origin sent with blob-store requests.
    pub origin: &'static str,
    /// imagex service id scoped to AIGC image upload.
    pub service_id: &'static str,
    /// Application id sent in common request parameters.
    pub app_id: &'static str,
}

/// CN deployment ("Jimeng").
const CN: RegionEndpoints = RegionEndpoints {
    api_base: "https://jimeng.jianying.com",
    imagex_base: "https://imagex.bytedanceapi.com",
    commerce_base: None,
    aws_region: "cn-north-1",
    origin: "https://jimeng.jianying.com",
    service_id: "tb4s082cfz",
    app_id: "513695",
};

/// US deployment ("Dreamina").
const US: RegionEndpoints = RegionEndpoints {
    api_base: "https://dreamina-us.capcut.com",
    imagex_base: "https://imagex-us-east-1.bytedanceapi.com",
    commerce_base: Some("https://commerce-api-us.capcut.com"),
    aws_region: "us-east-1",
    origin: "https://dreamina.capcut.com",
    service_id: "5vbtg2wkqf",
    app_id: "513641",
};

/// HK/SG/JP deployment ("Dreamina").
const HK: RegionEndpoints = RegionEndpoints {
    api_base: "https://dreamina-hk.capcut.com",
    imagex_base: "https://imagex-ap-singapore-1.bytedanceapi.com",
    commerce_base: Some("https://commerce-api-sg.capcut.com"),
    aws_region: "ap-singapore-1",
    origin: "https://dreamina.capcut.com",
    service_id: "8h2xk5qnrd",
    app_id: "513641",
};

/// Returns the built-in endpoint row for a region.
pub fn builtin(region: Region) -> RegionEndpoints {
    match region {
        Region::Cn => CN,
        Region::Us => US,
        Region::Hk => HK,
    }
}

/// Endpoint row after mirror substitution.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoints {
    pub region: Region,
    pub api_base: String,
    pub imagex_base: String,
    pub commerce_base: Option<String>,
    pub aws_region: String,
    pub origin: String,
    pub service_id: String,
    pub app_id: String,
}

/// Resolves the endpoint row for a region, applying configured mirrors.
pub fn resolve_endpoints(region: Region, mirrors: &MirrorSettings) -> ResolvedEndpoints {
    let base = builtin(region);

    let (api_mirror, imagex_mirror, commerce_mirror) = match region {
        Region::Cn => (&mirrors.jimeng_cn, &mirrors.imagex_cn, &None),
        Region::Us => (&mirrors.dreamina_us, &mirrors.imagex_us, &mirrors.commerce_us),
        Region::Hk => (&mirrors.dreamina_hk, &mirrors.imagex_hk, &mirrors.commerce_hk),
    };

    ResolvedEndpoints {
        region,
        api_base: pick(api_mirror, base.api_base),
        imagex_base: pick(imagex_mirror, base.imagex_base),
        commerce_base: commerce_mirror
            .clone()
            .map(normalize)
            .or_else(|| base.commerce_base.map(str::to_string)),
        aws_region: base.aws_region.to_string(),
        origin: base.origin.to_string(),
        service_id: base.service_id.to_string(),
        app_id: base.app_id.to_string(),
    }
}

fn pick(mirror: &Option<String>, builtin: &str) -> String {
    match mirror {
        Some(url) => normalize(url.clone()),
        None => builtin.to_string(),
    }
}

/// Strips a trailing slash so joined paths don't double up.
fn normalize(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

impl ResolvedEndpoints {
    /// Host portion of the imagex base, as used in SigV4 canonical headers.
    pub fn imagex_host(&self) -> &str {
        self.imagex_base
            .strip_prefix("https://")
            .or_else(|| self.imagex_base.strip_prefix("http://"))
            .unwrap_or(&self.imagex_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rows_differ_per_region() {
        assert_ne!(builtin(Region::Cn).aws_region, builtin(Region::Us).aws_region);
        assert_ne!(builtin(Region::Us).service_id, builtin(Region::Hk).service_id);
    }

    #[test]
    fn test_resolve_without_mirrors_uses_builtin() {
        let resolved = resolve_endpoints(Region::Cn, &MirrorSettings::default());
        assert_eq!(resolved.api_base, "https://jimeng.jianying.com");
        assert_eq!(resolved.aws_region, "cn-north-1");
        assert!(resolved.commerce_base.is_none());
    }

    #[test]
    fn test_resolve_with_mirror_substitutes_base() {
        let mirrors = MirrorSettings {
            dreamina_us: Some("https://mirror.example.com/".to_string()),
            ..Default::default()
        };
        let resolved = resolve_endpoints(Region::Us, &mirrors);
        assert_eq!(resolved.api_base, "https://mirror.example.com");
        // Untouched entries keep their builtin values.
        assert_eq!(
            resolved.imagex_base,
            "https://imagex-us-east-1.bytedanceapi.com"
        );
    }

    #[test]
    fn test_mirror_for_other_region_does_not_apply() {
        let mirrors = MirrorSettings {
            dreamina_us: Some("https://mirror.example.com".to_string()),
            ..Default::default()
        };
        let resolved = resolve_endpoints(Region::Hk, &mirrors);
        assert_eq!(resolved.api_base, "https://dreamina-hk.capcut.com");
    }

    #[test]
    fn test_imagex_host_strips_scheme() {
        let resolved = resolve_endpoints(Region::Cn, &MirrorSettings::default());
        assert_eq!(resolved.imagex_host(), "imagex.bytedanceapi.com");
    }
}
