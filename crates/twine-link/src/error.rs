//! Link driver error types.

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed link-layer address: {0}")]
    BadAddress(String),

    #[error("pipe peer detached")]
    PeerGone,

    #[error("link is not running")]
    NotRunning,
}
