pub mod config;
pub mod error;
pub mod metrics;
pub mod oci;
pub mod registry;
pub mod routing;
pub mod server;

pub use config::Config;
pub use error::{MirrorError, Result};
pub use registry::{AppState, MIRRORED_HEADER, MIRRORED_HEADER_VALUE};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::metrics::MetricsRecorder;
use crate::oci::OciStore;
use crate::routing::PeerRouter;

/// Start the registry mirror with the given configuration and injected
/// collaborators.
pub async fn start_server(
    config: Config,
    store: Arc<dyn OciStore>,
    router: Arc<dyn PeerRouter>,
    metrics: Arc<dyn MetricsRecorder>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let state = AppState::new(&config, store, router, metrics)?;
    server::start_server(&addr, state).await
}
