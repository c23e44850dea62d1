//! Registry front-end: dispatches distribution requests either to the
//! mirror proxy or, for requests already marked as mirrored, to the local
//! content store.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::MirrorError;
use crate::metrics::{CacheOutcome, RequestSource};
use crate::oci::path::{parse_path, RefKind};
use crate::registry::mirror::handle_mirror;
use crate::registry::{AppState, MIRRORED_HEADER, MIRRORED_HEADER_VALUE};

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";

#[derive(Debug, Default, Deserialize)]
pub struct RegistryQuery {
    /// Upstream registry host this request mirrors, set by the runtime.
    #[serde(default)]
    pub ns: Option<String>,
}

/// GET /healthz. Ready once the router knows at least one peer.
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    match state.router.has_mirrors() {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(err) => {
            tracing::error!(error = %err, "readiness check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// /v2 and /v2/: the API version probe answers 200 for GET only.
pub async fn probe_handler(method: Method) -> StatusCode {
    if method == Method::GET {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

/// All /v2/{name}/... traffic.
pub async fn registry_handler(
    State(state): State<AppState>,
    Query(query): Query<RegistryQuery>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    // Pull-only surface.
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::NOT_FOUND.into_response();
    }

    let parsed = match parse_path(query.ns.as_deref(), uri.path()) {
        Ok(parsed) => parsed,
        Err(err) => return (StatusCode::NOT_FOUND, err.to_string()).into_response(),
    };

    // latest is mutable; peers may hold stale copies.
    if !state.resolve_latest_tag && parsed.tag() == Some("latest") {
        tracing::debug!(name = %parsed.name, "refusing to resolve latest tag");
        return StatusCode::NOT_FOUND.into_response();
    }

    let mirrored = headers
        .get(MIRRORED_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some(MIRRORED_HEADER_VALUE);

    if !mirrored {
        let is_external = is_external_request(&state, &headers);
        let key = parsed.key();
        let response = handle_mirror(&state, &method, &uri, &headers, &key, is_external).await;
        let cache = if response.status() == StatusCode::OK {
            CacheOutcome::Hit
        } else {
            CacheOutcome::Miss
        };
        let source = if is_external {
            RequestSource::External
        } else {
            RequestSource::Internal
        };
        state
            .metrics
            .record_mirror_request(query.ns.as_deref().unwrap_or_default(), cache, source);
        return response;
    }

    // The request came from another peer: serve from the local store only.
    let digest = match &parsed.digest {
        Some(digest) => digest.clone(),
        None => {
            let reference = parsed.reference.as_deref().unwrap_or_default();
            match state.store.resolve(reference).await {
                Ok(digest) => digest,
                Err(err) => {
                    tracing::debug!(reference = %reference, error = %err, "tag resolution failed");
                    return (StatusCode::NOT_FOUND, err.to_string()).into_response();
                }
            }
        }
    };

    match parsed.kind {
        RefKind::Manifest => handle_manifest(&state, &method, &digest).await,
        RefKind::Blob => handle_blob(&state, &method, &digest).await,
    }
}

fn is_external_request(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| host != state.local_addr)
        .unwrap_or(true)
}

async fn handle_manifest(state: &AppState, method: &Method, digest: &str) -> Response {
    let (bytes, media_type) = match state.store.read_blob(digest).await {
        Ok(found) => found,
        Err(err) => {
            tracing::debug!(digest = %digest, error = %err, "manifest read failed");
            return (StatusCode::NOT_FOUND, err.to_string()).into_response();
        }
    };
    let headers = [
        ("Content-Type", media_type),
        ("Content-Length", bytes.len().to_string()),
        (DOCKER_CONTENT_DIGEST, digest.to_string()),
    ];
    if *method == Method::HEAD {
        return (StatusCode::OK, headers).into_response();
    }
    (StatusCode::OK, headers, bytes).into_response()
}

async fn handle_blob(state: &AppState, method: &Method, digest: &str) -> Response {
    let size = match state.store.size(digest).await {
        Ok(size) => size,
        Err(err @ MirrorError::NotFound(_)) => {
            return (StatusCode::NOT_FOUND, err.to_string()).into_response();
        }
        Err(err) => {
            tracing::error!(digest = %digest, error = %err, "blob size lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };
    let headers = [
        ("Content-Length", size.to_string()),
        (DOCKER_CONTENT_DIGEST, digest.to_string()),
    ];
    if *method == Method::HEAD {
        return (StatusCode::OK, headers).into_response();
    }
    match state.store.blob_reader(digest).await {
        Ok(reader) => {
            let body = Body::from_stream(ReaderStream::new(reader));
            (StatusCode::OK, headers, body).into_response()
        }
        Err(err @ MirrorError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
        Err(err) => {
            tracing::error!(digest = %digest, error = %err, "blob open failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
