mod codec_error;
mod codec_registry;
mod compress_type;
mod compressor;
mod serialize_type;

pub use codec_error::CodecError;
pub use codec_registry::{CodecRegistry, CodecRegistryBuilder};
pub use compress_type::CompressType;
pub use compressor::{Compressor, GzipCompressor};
pub use serialize_type::SerializeType;
