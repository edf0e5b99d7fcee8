//! Node-level error type.

use twine_core::CryptoError;
use twine_link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("identity error: {0}")]
    Identity(#[from] CryptoError),

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = NodeError::Config("missing [node] section".into());
        assert_eq!(
            err.to_string(),
            "configuration error: missing [node] section"
        );
    }

    #[test]
    fn from_crypto_error() {
        let err: NodeError = CryptoError::InvalidSecretKey("bad hex".into()).into();
        assert!(matches!(err, NodeError::Identity(_)));
    }
}
