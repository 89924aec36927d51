use thiserror::Error;

/// Failures raised while turning values into payload bytes and back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unsupported serialize type: {0}")]
    UnsupportedSerializeType(u8),

    #[error("unsupported compress type: {0}")]
    UnsupportedCompressType(u8),

    #[error("failed to serialize payload: {0}")]
    Serialize(String),

    #[error("failed to deserialize payload: {0}")]
    Deserialize(String),

    #[error("failed to compress payload: {0}")]
    Compress(String),

    #[error("failed to decompress payload: {0}")]
    Decompress(String),
}
