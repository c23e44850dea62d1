//! Tests for the image manifest graph walk.
//!
//! The fixtures are a real multi-platform image index (amd64, arm/v7 and
//! arm64 manifests plus their attestation manifests) in both with- and
//! without-mediaType form. The expected digest chains are order-sensitive:
//! root, then per matching manifest its digest, config and layers.

use std::collections::HashMap;

use async_trait::async_trait;
use mirror::error::{MirrorError, Result};
use mirror::oci::store::detect_media_type;
use mirror::oci::{walk_image, HostPlatform, Image, OciStore};
use tokio::io::AsyncRead;

const INDEX_DIGEST: &str =
    "sha256:e80e36564e9617f684eb5972bf86dc9e9e761216e0d40ff78ca07741ec70725a";
const INDEX_NO_MEDIA_TYPE_DIGEST: &str =
    "sha256:e2db0e6787216c5abfc42ea8ec82812e41782f3bc6e3b5221d5ef9c800e6c507";
const AMD64_MANIFEST_DIGEST: &str =
    "sha256:44cb2cf712c060f69df7310e99339c1eb51a085446f1bb6d44469acff35b4355";
const ARM64_MANIFEST_DIGEST: &str =
    "sha256:dce623533c59af554b85f859e91fc1cbb7f574e873c82f36b9ea05a09feb0b53";
const ARM_MANIFEST_DIGEST: &str =
    "sha256:0ad7c556c55464fa44d4c41e5236715e015b0266daced62140fb5c6b983c946b";

const INDEX_MANIFESTS: &str = r#"[ { "mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:44cb2cf712c060f69df7310e99339c1eb51a085446f1bb6d44469acff35b4355", "size": 2372, "platform": { "architecture": "amd64", "os": "linux" } }, { "mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:0ad7c556c55464fa44d4c41e5236715e015b0266daced62140fb5c6b983c946b", "size": 2372, "platform": { "architecture": "arm", "os": "linux", "variant": "v7" } }, { "mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:dce623533c59af554b85f859e91fc1cbb7f574e873c82f36b9ea05a09feb0b53", "size": 2372, "platform": { "architecture": "arm64", "os": "linux" } }, { "mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:73af5483f4d2d636275dcef14d5443ff96d7347a0720ca5a73a32c73855c4aac", "size": 566, "annotations": { "vnd.docker.reference.digest": "sha256:44cb2cf712c060f69df7310e99339c1eb51a085446f1bb6d44469acff35b4355", "vnd.docker.reference.type": "attestation-manifest" }, "platform": { "architecture": "unknown", "os": "unknown" } }, { "mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:36e11bf470af256febbdfad9d803e60b7290b0268218952991b392be9e8153bd", "size": 566, "annotations": { "vnd.docker.reference.digest": "sha256:0ad7c556c55464fa44d4c41e5236715e015b0266daced62140fb5c6b983c946b", "vnd.docker.reference.type": "attestation-manifest" }, "platform": { "architecture": "unknown", "os": "unknown" } }, { "mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:42d1c43f2285e8e3d39f80b8eed8e4c5c28b8011c942b5413ecc6a0050600609", "size": 566, "annotations": { "vnd.docker.reference.digest": "sha256:dce623533c59af554b85f859e91fc1cbb7f574e873c82f36b9ea05a09feb0b53", "vnd.docker.reference.type": "attestation-manifest" }, "platform": { "architecture": "unknown", "os": "unknown" } } ]"#;

const AMD64_MANIFEST: &str = r#"{ "mediaType": "application/vnd.oci.image.manifest.v1+json", "schemaVersion": 2, "config": { "mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:d715ba0d85ee7d37da627d0679652680ed2cb23dde6120f25143a0b8079ee47e", "size": 2842 }, "layers": [ { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:a7ca0d9ba68fdce7e15bc0952d3e898e970548ca24d57698725836c039086639", "size": 103732 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:fe5ca62666f04366c8e7f605aa82997d71320183e99962fa76b3209fdfbb8b58", "size": 21202 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:b02a7525f878e61fc1ef8a7405a2cc17f866e8de222c1c98fd6681aff6e509db", "size": 716491 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:fcb6f6d2c9986d9cd6a2ea3cc2936e5fc613e09f1af9042329011e43057f3265", "size": 317 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:e8c73c638ae9ec5ad70c49df7e484040d889cca6b4a9af056579c3d058ea93f0", "size": 198 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:1e3d9b7d145208fa8fa3ee1c9612d0adaac7255f1bbc9ddea7e461e0b317805c", "size": 113 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:4aa0ea1413d37a58615488592a0b827ea4b2e48fa5a77cf707d0e35f025e613f", "size": 385 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:7c881f9ab25e0d86562a123b5fb56aebf8aa0ddd7d48ef602faf8d1e7cf43d8c", "size": 355 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:5627a970d25e752d971a501ec7e35d0d6fdcd4a3ce9e958715a686853024794a", "size": 130562 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:76f3a495ffdc00c612747ba0c59fc56d0a2610d2785e80e9edddbf214c2709ef", "size": 36529876 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:4f4fb700ef54461cfa02571ae0db9a0dc1e0cdb5577484a6d75e68dc38e8acc1", "size": 32 } ] }"#;

const ARM64_MANIFEST: &str = r#"{ "mediaType": "application/vnd.oci.image.manifest.v1+json", "schemaVersion": 2, "config": { "mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:c73129c9fb699b620aac2df472196ed41797fd0f5a90e1942bfbf19849c4a1c9", "size": 2842 }, "layers": [ { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:0b41f743fd4d78cb50ba86dd3b951b51458744109e1f5063a76bc5a792c3d8e7", "size": 103732 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:fe5ca62666f04366c8e7f605aa82997d71320183e99962fa76b3209fdfbb8b58", "size": 21202 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:b02a7525f878e61fc1ef8a7405a2cc17f866e8de222c1c98fd6681aff6e509db", "size": 716491 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:fcb6f6d2c9986d9cd6a2ea3cc2936e5fc613e09f1af9042329011e43057f3265", "size": 317 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:e8c73c638ae9ec5ad70c49df7e484040d889cca6b4a9af056579c3d058ea93f0", "size": 198 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:1e3d9b7d145208fa8fa3ee1c9612d0adaac7255f1bbc9ddea7e461e0b317805c", "size": 113 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:4aa0ea1413d37a58615488592a0b827ea4b2e48fa5a77cf707d0e35f025e613f", "size": 385 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:7c881f9ab25e0d86562a123b5fb56aebf8aa0ddd7d48ef602faf8d1e7cf43d8c", "size": 355 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:5627a970d25e752d971a501ec7e35d0d6fdcd4a3ce9e958715a686853024794a", "size": 130562 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:0dc769edeab7d9f622b9703579f6c89298a4cf45a84af1908e26fffca55341e1", "size": 34168923 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:4f4fb700ef54461cfa02571ae0db9a0dc1e0cdb5577484a6d75e68dc38e8acc1", "size": 32 } ] }"#;

const ARM_MANIFEST: &str = r#"{ "mediaType": "application/vnd.oci.image.manifest.v1+json", "schemaVersion": 2, "config": { "mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:1079836371d57a148a0afa5abfe00bd91825c869fcc6574a418f4371d53cab4c", "size": 2855 }, "layers": [ { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:b437b30b8b4cc4e02865517b5ca9b66501752012a028e605da1c98beb0ed9f50", "size": 103732 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:fe5ca62666f04366c8e7f605aa82997d71320183e99962fa76b3209fdfbb8b58", "size": 21202 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:b02a7525f878e61fc1ef8a7405a2cc17f866e8de222c1c98fd6681aff6e509db", "size": 716491 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:fcb6f6d2c9986d9cd6a2ea3cc2936e5fc613e09f1af9042329011e43057f3265", "size": 317 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:e8c73c638ae9ec5ad70c49df7e484040d889cca6b4a9af056579c3d058ea93f0", "size": 198 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:1e3d9b7d145208fa8fa3ee1c9612d0adaac7255f1bbc9ddea7e461e0b317805c", "size": 113 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:4aa0ea1413d37a58615488592a0b827ea4b2e48fa5a77cf707d0e35f025e613f", "size": 385 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:7c881f9ab25e0d86562a123b5fb56aebf8aa0ddd7d48ef602faf8d1e7cf43d8c", "size": 355 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:5627a970d25e752d971a501ec7e35d0d6fdcd4a3ce9e958715a686853024794a", "size": 130562 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:01d28554416aa05390e2827a653a1289a2a549e46cc78d65915a75377c6008ba", "size": 34318536 }, { "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip", "digest": "sha256:4f4fb700ef54461cfa02571ae0db9a0dc1e0cdb5577484a6d75e68dc38e8acc1", "size": 32 } ] }"#;

struct MapStore {
    blobs: HashMap<String, String>,
}

impl MapStore {
    fn with_fixtures() -> Self {
        let mut blobs = HashMap::new();
        blobs.insert(
            INDEX_DIGEST.to_string(),
            format!(
                r#"{{ "mediaType": "application/vnd.oci.image.index.v1+json", "schemaVersion": 2, "manifests": {} }}"#,
                INDEX_MANIFESTS
            ),
        );
        blobs.insert(
            INDEX_NO_MEDIA_TYPE_DIGEST.to_string(),
            format!(
                r#"{{ "schemaVersion": 2, "manifests": {} }}"#,
                INDEX_MANIFESTS
            ),
        );
        blobs.insert(AMD64_MANIFEST_DIGEST.to_string(), AMD64_MANIFEST.to_string());
        blobs.insert(ARM64_MANIFEST_DIGEST.to_string(), ARM64_MANIFEST.to_string());
        blobs.insert(ARM_MANIFEST_DIGEST.to_string(), ARM_MANIFEST.to_string());
        Self { blobs }
    }
}

#[async_trait]
impl OciStore for MapStore {
    async fn resolve(&self, name: &str) -> Result<String> {
        Err(MirrorError::NotFound(format!("image {}", name)))
    }

    async fn size(&self, digest: &str) -> Result<u64> {
        match self.blobs.get(digest) {
            Some(blob) => Ok(blob.len() as u64),
            None => Err(MirrorError::NotFound(format!("blob {}", digest))),
        }
    }

    async fn read_blob(&self, digest: &str) -> Result<(Vec<u8>, String)> {
        match self.blobs.get(digest) {
            Some(blob) => Ok((blob.clone().into_bytes(), detect_media_type(blob.as_bytes()))),
            None => Err(MirrorError::NotFound(format!("blob {}", digest))),
        }
    }

    async fn blob_reader(&self, digest: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        Err(MirrorError::NotFound(format!("blob {}", digest)))
    }
}

fn image(digest: &str) -> Image {
    Image {
        name: "ghcr.io/example/app:v0.0.8".to_string(),
        digest: digest.to_string(),
    }
}

const AMD64_CHAIN: &[&str] = &[
    "sha256:44cb2cf712c060f69df7310e99339c1eb51a085446f1bb6d44469acff35b4355",
    "sha256:d715ba0d85ee7d37da627d0679652680ed2cb23dde6120f25143a0b8079ee47e",
    "sha256:a7ca0d9ba68fdce7e15bc0952d3e898e970548ca24d57698725836c039086639",
    "sha256:fe5ca62666f04366c8e7f605aa82997d71320183e99962fa76b3209fdfbb8b58",
    "sha256:b02a7525f878e61fc1ef8a7405a2cc17f866e8de222c1c98fd6681aff6e509db",
    "sha256:fcb6f6d2c9986d9cd6a2ea3cc2936e5fc613e09f1af9042329011e43057f3265",
    "sha256:e8c73c638ae9ec5ad70c49df7e484040d889cca6b4a9af056579c3d058ea93f0",
    "sha256:1e3d9b7d145208fa8fa3ee1c9612d0adaac7255f1bbc9ddea7e461e0b317805c",
    "sha256:4aa0ea1413d37a58615488592a0b827ea4b2e48fa5a77cf707d0e35f025e613f",
    "sha256:7c881f9ab25e0d86562a123b5fb56aebf8aa0ddd7d48ef602faf8d1e7cf43d8c",
    "sha256:5627a970d25e752d971a501ec7e35d0d6fdcd4a3ce9e958715a686853024794a",
    "sha256:76f3a495ffdc00c612747ba0c59fc56d0a2610d2785e80e9edddbf214c2709ef",
    "sha256:4f4fb700ef54461cfa02571ae0db9a0dc1e0cdb5577484a6d75e68dc38e8acc1",
];

fn expected_keys(root: &str, chain: &[&str]) -> Vec<String> {
    let mut keys = vec![root.to_string()];
    keys.extend(chain.iter().map(|d| d.to_string()));
    keys
}

#[tokio::test]
async fn test_walk_amd64_with_media_type() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "amd64");
    let keys = walk_image(&store, &image(INDEX_DIGEST), &matcher)
        .await
        .unwrap();
    assert_eq!(keys, expected_keys(INDEX_DIGEST, AMD64_CHAIN));
    assert_eq!(keys.len(), 14);
}

#[tokio::test]
async fn test_walk_tolerates_missing_media_type() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "amd64");
    let keys = walk_image(&store, &image(INDEX_NO_MEDIA_TYPE_DIGEST), &matcher)
        .await
        .unwrap();
    assert_eq!(keys, expected_keys(INDEX_NO_MEDIA_TYPE_DIGEST, AMD64_CHAIN));
}

#[tokio::test]
async fn test_walk_arm64() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "arm64");
    let keys = walk_image(&store, &image(INDEX_DIGEST), &matcher)
        .await
        .unwrap();
    assert_eq!(keys[0], INDEX_DIGEST);
    assert_eq!(keys[1], ARM64_MANIFEST_DIGEST);
    assert_eq!(
        keys[2],
        "sha256:c73129c9fb699b620aac2df472196ed41797fd0f5a90e1942bfbf19849c4a1c9"
    );
    assert_eq!(
        keys[3],
        "sha256:0b41f743fd4d78cb50ba86dd3b951b51458744109e1f5063a76bc5a792c3d8e7"
    );
    assert_eq!(keys.len(), 14);
}

#[tokio::test]
async fn test_walk_arm_matches_variant() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "arm");
    let keys = walk_image(&store, &image(INDEX_DIGEST), &matcher)
        .await
        .unwrap();
    assert_eq!(keys[1], ARM_MANIFEST_DIGEST);
    assert_eq!(keys.len(), 14);
}

#[tokio::test]
async fn test_walk_unsupported_platform() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("darwin", "arm64");
    let err = walk_image(&store, &image(INDEX_DIGEST), &matcher)
        .await
        .unwrap_err();
    match err {
        MirrorError::NoMatchingPlatform(digest) => assert_eq!(digest, INDEX_DIGEST),
        other => panic!("expected NoMatchingPlatform, got: {}", other),
    }
}

#[tokio::test]
async fn test_walk_skips_attestation_manifests() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "amd64");
    let keys = walk_image(&store, &image(INDEX_DIGEST), &matcher)
        .await
        .unwrap();
    for attestation in [
        "sha256:73af5483f4d2d636275dcef14d5443ff96d7347a0720ca5a73a32c73855c4aac",
        "sha256:36e11bf470af256febbdfad9d803e60b7290b0268218952991b392be9e8153bd",
        "sha256:42d1c43f2285e8e3d39f80b8eed8e4c5c28b8011c942b5413ecc6a0050600609",
    ] {
        assert!(!keys.contains(&attestation.to_string()));
    }
}

#[tokio::test]
async fn test_walk_is_deterministic() {
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "amd64");
    let first = walk_image(&store, &image(INDEX_DIGEST), &matcher)
        .await
        .unwrap();
    for _ in 0..3 {
        let again = walk_image(&store, &image(INDEX_DIGEST), &matcher)
            .await
            .unwrap();
        assert_eq!(first, again);
    }
}

#[tokio::test]
async fn test_walk_plain_manifest_root() {
    // A single-platform image whose root is a manifest, not an index.
    let store = MapStore::with_fixtures();
    let matcher = HostPlatform::new("linux", "amd64");
    let keys = walk_image(&store, &image(AMD64_MANIFEST_DIGEST), &matcher)
        .await
        .unwrap();
    assert_eq!(keys, expected_keys(AMD64_MANIFEST_DIGEST, &AMD64_CHAIN[1..]));
}
