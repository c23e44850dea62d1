//! OCI data model and the local content store adapter.

pub mod mirror_config;
pub mod path;
pub mod store;

pub use mirror_config::{add_mirror_configuration, create_filters};
pub use path::{parse_path, ParsedPath, RefKind};
pub use store::{walk_image, FsStore, OciStore};

use serde::{Deserialize, Serialize};

pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// A locally available image. Identity is the digest; the name is a
/// registry-qualified human label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub name: String,
    pub digest: String,
}

/// Content descriptor as it appears in index and manifest documents.
/// `media_type` is optional because some registries omit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// Host-supplied predicate deciding which platform manifests of an index
/// belong to this node.
pub trait PlatformMatcher: Send + Sync {
    fn matches(&self, platform: &Platform) -> bool;
}

/// Exact os/architecture matcher. A variant is only compared when the
/// matcher carries one, so `linux/arm` accepts `linux/arm/v7`.
#[derive(Debug, Clone)]
pub struct HostPlatform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl HostPlatform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// Matcher for the platform this binary was built for.
    pub fn current() -> Self {
        let architecture = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self::new(std::env::consts::OS, architecture)
    }
}

impl PlatformMatcher for HostPlatform {
    fn matches(&self, platform: &Platform) -> bool {
        if platform.architecture == "unknown" {
            return false;
        }
        if platform.os != self.os || platform.architecture != self.architecture {
            return false;
        }
        match &self.variant {
            Some(variant) => platform.variant.as_deref() == Some(variant.as_str()),
            None => true,
        }
    }
}

/// Loose check for the canonical `algo:hex` digest form. Digests are
/// otherwise treated as opaque comparable strings.
pub fn is_digest(s: &str) -> bool {
    let Some((algo, hex)) = s.split_once(':') else {
        return false;
    };
    if algo.is_empty() || hex.is_empty() {
        return false;
    }
    if !algo
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    {
        return false;
    }
    if !hex
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }
    match algo {
        "sha256" => hex.len() == 64,
        "sha512" => hex.len() == 128,
        _ => true,
    }
}
