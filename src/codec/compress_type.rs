use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Compressor tag carried on the wire.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum CompressType {
    #[default]
    None = 0,
    Gzip = 1,
}
