// Frame related constants

/// Magic value opening every frame ("SANR").
pub const FRAME_MAGIC: u32 = 0x5341_4E52;

pub const FRAME_MAGIC_OFFSET: usize = 0;
pub const FRAME_MAGIC_SIZE: usize = 4;

/// Byte offset of the 4-byte big-endian body length.
pub const FRAME_LENGTH_OFFSET: usize = 4;
pub const FRAME_LENGTH_FIELD_SIZE: usize = 4;

/// Total size of the fixed header preceding the serialized body.
pub const FRAME_HEADER_SIZE: usize = FRAME_LENGTH_OFFSET + FRAME_LENGTH_FIELD_SIZE; // 4 + 4 = 8

/// Upper bound on a single frame body unless a caller configures another limit.
///
/// The length prefix is read before the body, so this is checked before any
/// allocation takes place.
pub const DEFAULT_MAX_FRAME_BODY_SIZE: usize = 16 * 1024 * 1024;

// Payload codec constants

/// Payloads at or below this many bytes are never compressed, even when the
/// caller asked for a compressor.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 1024;
