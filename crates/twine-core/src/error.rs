//! Error types for the core crate.

/// Errors from the msgpack wire codec.
///
/// Decoding is total: every malformed input maps to one of these variants,
/// and the caller is expected to drop the frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("msgpack encode error: {0}")]
    Encode(String),

    #[error("msgpack decode error: {0}")]
    Decode(String),

    #[error("unexpected message shape: {0}")]
    Shape(&'static str),

    #[error("unknown {what} ordinal: {value}")]
    UnknownOrdinal { what: &'static str, value: u64 },

    #[error("payload kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors from identity parsing and the sealed payload primitive.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid public key address: {0}")]
    InvalidPublicKey(String),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("sealed payload too short: need at least {min} bytes, got {actual}")]
    SealedTooShort { min: usize, actual: usize },

    #[error("authenticated decryption failed")]
    Unsealable,
}
