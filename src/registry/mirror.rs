//! Mirror proxy: resolve a content key to candidate peers and reverse-proxy
//! the request to the first peer that can actually serve it.

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio::time::{timeout_at, Instant};

use crate::error::{MirrorError, Result};
use crate::registry::{AppState, MIRRORED_HEADER, MIRRORED_HEADER_VALUE};

// Connection-level headers must not be copied between hops; the server
// frames the proxied body itself.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Try each candidate peer in resolution order until one streams a 200.
///
/// The whole resolution, including candidate attempts, runs under the
/// resolve deadline. A deadline hit means a peer might still exist and the
/// runtime should fall back upstream (404); a closed candidate stream means
/// every known peer was tried (500). Once a peer has answered 200 the body
/// transfer proceeds without a deadline, since layers can be large.
pub async fn handle_mirror(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    key: &str,
    is_external: bool,
) -> Response {
    let deadline = Instant::now() + state.resolve_timeout;
    if is_external {
        tracing::info!(key = %key, path = %uri.path(), "handling mirror request from external node");
    }

    let resolved = timeout_at(
        deadline,
        state.router.resolve(key, is_external, state.resolve_retries),
    )
    .await;
    let mut candidates = match resolved {
        Err(_) => return timeout_response(key),
        Ok(Err(err)) => {
            tracing::error!(key = %key, error = %err, "failed to start mirror resolution");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
        Ok(Ok(stream)) => stream,
    };

    loop {
        let candidate = match timeout_at(deadline, candidates.recv()).await {
            Err(_) => return timeout_response(key),
            Ok(None) => {
                tracing::warn!(key = %key, "mirror resolution has been exhausted");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "mirror resolution has been exhausted".to_string(),
                )
                    .into_response();
            }
            Ok(Some(candidate)) => candidate,
        };

        match timeout_at(deadline, attempt_peer(state, &candidate, method, uri, headers)).await {
            Err(_) => return timeout_response(key),
            Ok(Ok(response)) => {
                tracing::debug!(peer = %candidate, path = %uri.path(), "mirrored request");
                return response;
            }
            Ok(Err(err)) => {
                // Bad peer status and transport failures are absorbed here;
                // the client has seen nothing yet, so move on.
                tracing::debug!(
                    peer = %candidate,
                    key = %key,
                    error = %err,
                    "mirror attempt failed, trying next candidate"
                );
            }
        }
    }
}

fn timeout_response(key: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("could not resolve mirror for key: {}", key),
    )
        .into_response()
}

/// One proxied attempt against a peer. Returns Ok only for a 200 response;
/// nothing is committed to the client before that, so a failed attempt is
/// invisible and the next candidate can be tried.
async fn attempt_peer(
    state: &AppState,
    peer: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response> {
    let base = peer.trim_end_matches('/');
    let target = match uri.query() {
        Some(query) => format!("{}{}?{}", base, uri.path(), query),
        None => format!("{}{}", base, uri.path()),
    };

    let mut request = if *method == Method::HEAD {
        state.client.head(&target)
    } else {
        state.client.get(&target)
    };
    for (name, value) in headers {
        let name_str = name.as_str();
        if name_str == "host" || name_str.eq_ignore_ascii_case(MIRRORED_HEADER) {
            continue;
        }
        request = request.header(name_str, value.as_bytes());
    }
    // The loop breaker: the receiving peer serves locally instead of
    // resolving again, which would recurse forever.
    request = request.header(MIRRORED_HEADER, MIRRORED_HEADER_VALUE);

    let upstream = request.send().await?;
    let status = upstream.status();
    if status != reqwest::StatusCode::OK {
        // Drop the body without forwarding any of it.
        return Err(MirrorError::PeerBadStatus(status.as_u16()));
    }

    let mut response = axum::http::Response::builder().status(StatusCode::OK);
    for (name, value) in upstream.headers() {
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response = response.header(name.as_str(), value.as_bytes());
    }
    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|err| MirrorError::Routing(err.to_string()))
}
