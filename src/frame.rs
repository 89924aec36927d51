mod frame_codec;
mod frame_error;
#[cfg(feature = "tokio_support")]
mod frame_io;

pub use frame_codec::FrameCodec;
pub use frame_error::{FrameDecodeError, FrameEncodeError};
#[cfg(feature = "tokio_support")]
pub use frame_io::{read_frame, write_frame};
