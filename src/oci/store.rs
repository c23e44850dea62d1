//! Local OCI content store: the trait the registry serves from, the
//! manifest graph walk, and a content-addressed filesystem implementation.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest as _, Sha256};
use tokio::fs;
use tokio::io::AsyncRead;

use crate::error::{MirrorError, Result};
use crate::oci::{
    Descriptor, Image, PlatformMatcher, MEDIA_TYPE_DOCKER_MANIFEST, MEDIA_TYPE_DOCKER_MANIFEST_LIST,
    MEDIA_TYPE_OCI_INDEX, MEDIA_TYPE_OCI_MANIFEST,
};

/// Read access to the node's OCI content store.
///
/// The store is expected to be safe for concurrent reads; implementations
/// are injected (filesystem store in production, in-memory mocks in tests).
#[async_trait]
pub trait OciStore: Send + Sync {
    /// Resolve an image name with tag to the digest of its top-level
    /// descriptor.
    async fn resolve(&self, name: &str) -> Result<String>;

    /// Size in bytes of the blob identified by digest.
    async fn size(&self, digest: &str) -> Result<u64>;

    /// Full-buffer read, returning the content and its media type. Used
    /// for manifests, which are small JSON documents.
    async fn read_blob(&self, digest: &str) -> Result<(Vec<u8>, String)>;

    /// Streaming reader for large blobs.
    async fn blob_reader(&self, digest: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;
}

// Image graphs are content-addressed DAGs, so no cycle detection is needed;
// the cap is a safety net against malformed documents.
const MAX_WALK_DEPTH: usize = 8;

/// A manifest document in either index or manifest form. Registries may
/// omit `mediaType`, in which case the structure decides.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDoc {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<Vec<Descriptor>>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Option<Vec<Descriptor>>,
}

impl ManifestDoc {
    fn is_index(&self) -> bool {
        match self.media_type.as_deref() {
            Some(MEDIA_TYPE_OCI_INDEX) | Some(MEDIA_TYPE_DOCKER_MANIFEST_LIST) => true,
            Some(MEDIA_TYPE_OCI_MANIFEST) | Some(MEDIA_TYPE_DOCKER_MANIFEST) => false,
            _ => self.manifests.is_some(),
        }
    }
}

/// Enumerate every digest belonging to an image: the root, then for each
/// platform-matching child manifest in index order its digest, config
/// digest, and layer digests in document order. The output is stable for a
/// fixed input and matcher.
///
/// Index children with platform architecture `unknown` are attestation
/// manifests, not image content; they are skipped without error. An index
/// where nothing else matches fails with `NoMatchingPlatform`.
pub async fn walk_image(
    store: &dyn OciStore,
    image: &Image,
    matcher: &dyn PlatformMatcher,
) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    walk_digest(store, image.digest.clone(), matcher, &mut keys, 0).await?;
    tracing::debug!(
        image = %image.name,
        digest = %image.digest,
        keys = keys.len(),
        "walked image manifest graph"
    );
    Ok(keys)
}

fn walk_digest<'a>(
    store: &'a dyn OciStore,
    digest: String,
    matcher: &'a dyn PlatformMatcher,
    keys: &'a mut Vec<String>,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if depth > MAX_WALK_DEPTH {
            return Err(MirrorError::GraphTooDeep(digest));
        }
        keys.push(digest.clone());

        let (bytes, _) = store.read_blob(&digest).await?;
        let doc: ManifestDoc = serde_json::from_slice(&bytes)?;

        if doc.is_index() {
            let manifests = doc.manifests.unwrap_or_default();
            let mut matched = Vec::new();
            for desc in manifests {
                match desc.platform.as_ref() {
                    Some(platform) if platform.architecture == "unknown" => continue,
                    Some(platform) if !matcher.matches(platform) => continue,
                    _ => matched.push(desc),
                }
            }
            if matched.is_empty() {
                return Err(MirrorError::NoMatchingPlatform(digest));
            }
            for desc in matched {
                walk_digest(store, desc.digest, matcher, keys, depth + 1).await?;
            }
            return Ok(());
        }

        if let Some(config) = doc.config {
            keys.push(config.digest);
        }
        for layer in doc.layers.unwrap_or_default() {
            keys.push(layer.digest);
        }
        Ok(())
    })
}

/// Media type of a stored document: the declared one when present,
/// structural inference otherwise.
pub fn detect_media_type(data: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Some(media_type) = value.get("mediaType").and_then(|m| m.as_str()) {
            return media_type.to_string();
        }
        if value.get("manifests").is_some() {
            return MEDIA_TYPE_OCI_INDEX.to_string();
        }
        if value.get("layers").is_some() || value.get("config").is_some() {
            return MEDIA_TYPE_OCI_MANIFEST.to_string();
        }
    }
    "application/octet-stream".to_string()
}

/// Content-addressed filesystem store.
///
/// Layout: `blobs/sha256/{hex}` for content, `images/{name}` files mapping
/// an image name to its top-level digest. Writes are atomic through a temp
/// file and rename.
#[derive(Debug)]
pub struct FsStore {
    blobs_dir: PathBuf,
    images_dir: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let blobs_dir = root.join("blobs").join("sha256");
        let images_dir = root.join("images");
        std::fs::create_dir_all(&blobs_dir)?;
        std::fs::create_dir_all(&images_dir)?;
        Ok(Self {
            blobs_dir,
            images_dir,
        })
    }

    pub fn blob_path(&self, digest: &str) -> PathBuf {
        let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        self.blobs_dir.join(hex)
    }

    fn image_path(&self, name: &str) -> PathBuf {
        // Tags carry a colon which is unsafe in file names on some systems.
        self.images_dir.join(name.replace(':', "_"))
    }

    /// Store content and return its digest.
    pub async fn put_blob(&self, data: &[u8]) -> Result<String> {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(data)));
        let path = self.blob_path(&digest);
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(digest)
    }

    /// Record an image name as pointing at a top-level digest.
    pub async fn tag_image(&self, name: &str, digest: &str) -> Result<()> {
        let path = self.image_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, digest).await?;
        tracing::debug!(name = %name, digest = %digest, "tagged image");
        Ok(())
    }
}

#[async_trait]
impl OciStore for FsStore {
    async fn resolve(&self, name: &str) -> Result<String> {
        let path = self.image_path(name);
        match fs::read_to_string(&path).await {
            Ok(digest) => Ok(digest.trim().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MirrorError::NotFound(format!("image {}", name)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn size(&self, digest: &str) -> Result<u64> {
        let path = self.blob_path(digest);
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MirrorError::NotFound(format!("blob {}", digest)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_blob(&self, digest: &str) -> Result<(Vec<u8>, String)> {
        let path = self.blob_path(digest);
        match fs::read(&path).await {
            Ok(bytes) => {
                let media_type = detect_media_type(&bytes);
                Ok((bytes, media_type))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MirrorError::NotFound(format!("blob {}", digest)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn blob_reader(&self, digest: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let path = self.blob_path(digest);
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(MirrorError::NotFound(format!("blob {}", digest)))
            }
            Err(err) => Err(err.into()),
        }
    }
}
