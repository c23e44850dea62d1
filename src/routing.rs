//! Peer discovery seam.
//!
//! The discovery substrate is an external collaborator; the registry only
//! depends on the `PeerRouter` trait. Candidates arrive on a bounded
//! channel so the resolver can stay lazy, and dropping the receiver
//! cancels production.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Stream of candidate peer base URLs (`scheme://host:port`). The sender
/// closes the channel when discovery is exhausted, which may happen before
/// the retry budget is spent.
pub type PeerStream = mpsc::Receiver<String>;

#[async_trait]
pub trait PeerRouter: Send + Sync {
    /// Whether any peer is currently known. Used for readiness.
    fn has_mirrors(&self) -> Result<bool>;

    /// Resolve a content key (digest or `name:tag`) to a stream of at most
    /// `max_attempts` candidate peers. `is_external` hints that the
    /// requester is not the local runtime, permitting farther peers.
    async fn resolve(&self, key: &str, is_external: bool, max_attempts: usize)
        -> Result<PeerStream>;
}

/// Router over a fixed peer list from configuration. It has no topology,
/// so the locality hint is ignored.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    peers: Vec<String>,
}

impl StaticRouter {
    pub fn new(peers: Vec<String>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerRouter for StaticRouter {
    fn has_mirrors(&self) -> Result<bool> {
        Ok(!self.peers.is_empty())
    }

    async fn resolve(
        &self,
        key: &str,
        _is_external: bool,
        max_attempts: usize,
    ) -> Result<PeerStream> {
        tracing::debug!(
            key = %key,
            candidates = self.peers.len().min(max_attempts),
            "resolving candidates from static peer list"
        );
        let (tx, rx) = mpsc::channel(1);
        let peers: Vec<String> = self.peers.iter().take(max_attempts).cloned().collect();
        tokio::spawn(async move {
            for peer in peers {
                // A closed channel means the request was cancelled or
                // satisfied; stop producing.
                if tx.send(peer).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
