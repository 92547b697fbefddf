use thiserror::Error;

/// Errors raised while building topology values from untrusted input
/// (deserialized payloads, configured seed endpoints).
///
/// Mixing key spaces inside a single range operation is a programming error
/// and panics instead of returning one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("key space size must be positive")]
    InvalidRingSize,

    #[error("invalid key range start={start} length={length} for ring of size {ring}")]
    InvalidRange { start: u32, length: u32, ring: u32 },

    #[error("key space mismatch: expected ring of size {expected}, got {actual}")]
    KeyspaceMismatch { expected: u32, actual: u32 },

    #[error("invalid node address '{0}', expected host:port")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
