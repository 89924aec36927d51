use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameEncodeError {
    /// The message body could not be serialized.
    #[error("failed to serialize frame body: {0}")]
    PayloadSerializeFailed(String),

    /// The serialized body does not fit the 4-byte length prefix.
    #[error("frame body of {0} bytes exceeds the length prefix")]
    BodyTooLarge(usize),
}

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    /// The header did not start with the expected magic value.
    #[error("frame magic mismatch: got {0:#010x}")]
    MagicMismatch(u32),

    /// The stream ended part way through a header or body.
    #[error("stream closed after {read} of {expected} frame bytes")]
    ShortRead { read: usize, expected: usize },

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame body of {len} bytes exceeds the {max} byte limit")]
    BodyTooLarge { len: usize, max: usize },

    #[error("failed to decode frame body: {0}")]
    BodyDecodeFailed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FrameDecodeError {
    /// True when the peer simply went away rather than sending garbage.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameDecodeError::ConnectionClosed | FrameDecodeError::ShortRead { .. } => true,
            FrameDecodeError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
