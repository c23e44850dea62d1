//! Registry front-end and the peer mirror proxy.

pub mod handler;
pub mod mirror;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::metrics::MetricsRecorder;
use crate::oci::OciStore;
use crate::routing::PeerRouter;

/// Requests carrying this header are served from the local store and never
/// re-proxied to peers. The name and value are fixed for cross-version
/// peer compatibility.
pub const MIRRORED_HEADER: &str = "X-Spegel-Mirrored";
pub const MIRRORED_HEADER_VALUE: &str = "true";

/// Shared request state: injected collaborators plus the resolve knobs.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OciStore>,
    pub router: Arc<dyn PeerRouter>,
    pub metrics: Arc<dyn MetricsRecorder>,
    pub client: reqwest::Client,
    pub resolve_retries: usize,
    pub resolve_timeout: Duration,
    pub resolve_latest_tag: bool,
    pub local_addr: String,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn OciStore>,
        router: Arc<dyn PeerRouter>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            store,
            router,
            metrics,
            client,
            resolve_retries: config.mirror.resolve_retries,
            resolve_timeout: config.mirror.resolve_timeout(),
            resolve_latest_tag: config.mirror.resolve_latest_tag,
            local_addr: config.mirror.local_addr.clone(),
        })
    }
}
