use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid distribution path: {0}")]
    InvalidPath(String),

    #[error("invalid registry url {reason}: {url}")]
    InvalidRegistryUrl { reason: String, url: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("could not find matching platform in index: {0}")]
    NoMatchingPlatform(String),

    #[error("expected mirror to respond with 200 OK but received: {0}")]
    PeerBadStatus(u16),

    #[error("manifest graph exceeds maximum depth at: {0}")]
    GraphTooDeep(String),

    #[error("routing error: {0}")]
    Routing(String),
}
