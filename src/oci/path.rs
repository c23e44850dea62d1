//! Parser for the pull subset of the OCI distribution API paths.

use crate::error::{MirrorError, Result};
use crate::oci::is_digest;

const V2_PREFIX: &str = "/v2/";
const MANIFESTS_INFIX: &str = "/manifests/";
const BLOBS_INFIX: &str = "/blobs/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Manifest,
    Blob,
}

/// Decoded distribution request path.
///
/// For manifest requests by tag, `reference` holds the fully qualified
/// `name:tag` form and `digest` is empty. For digest requests (manifest or
/// blob) `digest` is set and `reference` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub name: String,
    pub digest: Option<String>,
    pub reference: Option<String>,
    pub kind: RefKind,
}

impl ParsedPath {
    /// Content key used for peer resolution: the digest when known, the
    /// tag reference otherwise.
    pub fn key(&self) -> String {
        match &self.digest {
            Some(digest) => digest.clone(),
            None => self.reference.clone().unwrap_or_default(),
        }
    }

    /// Tag portion of a tag reference, if this is one.
    pub fn tag(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.rsplit_once(':'))
            .map(|(_, tag)| tag)
    }
}

/// Parse a `/v2/{name}/manifests/{reference}` or `/v2/{name}/blobs/{digest}`
/// path. `name` may contain slashes, so the last infix wins. A non-empty
/// `ns` query value carries the upstream registry host and is prepended to
/// the name.
pub fn parse_path(ns: Option<&str>, path: &str) -> Result<ParsedPath> {
    if !path.starts_with(V2_PREFIX) {
        return Err(MirrorError::InvalidPath(path.to_string()));
    }

    if let Some(idx) = path.rfind(MANIFESTS_INFIX) {
        if idx <= V2_PREFIX.len() {
            return Err(MirrorError::InvalidPath(path.to_string()));
        }
        let name = qualify(ns, &path[V2_PREFIX.len()..idx]);
        let reference = &path[idx + MANIFESTS_INFIX.len()..];
        if is_digest(reference) {
            return Ok(ParsedPath {
                name,
                digest: Some(reference.to_string()),
                reference: None,
                kind: RefKind::Manifest,
            });
        }
        if is_tag(reference) {
            let qualified = format!("{}:{}", name, reference);
            return Ok(ParsedPath {
                name,
                digest: None,
                reference: Some(qualified),
                kind: RefKind::Manifest,
            });
        }
        return Err(MirrorError::InvalidPath(format!(
            "invalid manifest reference: {}",
            reference
        )));
    }

    if let Some(idx) = path.rfind(BLOBS_INFIX) {
        if idx <= V2_PREFIX.len() {
            return Err(MirrorError::InvalidPath(path.to_string()));
        }
        let name = qualify(ns, &path[V2_PREFIX.len()..idx]);
        let digest = &path[idx + BLOBS_INFIX.len()..];
        if !is_digest(digest) {
            return Err(MirrorError::InvalidPath(format!(
                "invalid blob digest: {}",
                digest
            )));
        }
        return Ok(ParsedPath {
            name,
            digest: Some(digest.to_string()),
            reference: None,
            kind: RefKind::Blob,
        });
    }

    Err(MirrorError::InvalidPath(path.to_string()))
}

fn qualify(ns: Option<&str>, name: &str) -> String {
    match ns {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
        _ => name.to_string(),
    }
}

// Tag grammar: [A-Za-z0-9_][A-Za-z0-9._-]{0,127}
fn is_tag(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > 128 {
        return false;
    }
    if !(bytes[0].is_ascii_alphanumeric() || bytes[0] == b'_') {
        return false;
    }
    bytes[1..]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
