use crate::{
    constants::{
        FRAME_HEADER_SIZE, FRAME_LENGTH_FIELD_SIZE, FRAME_LENGTH_OFFSET, FRAME_MAGIC,
        FRAME_MAGIC_OFFSET, FRAME_MAGIC_SIZE,
    },
    frame::{FrameDecodeError, FrameEncodeError},
    rpc::RpcMessage,
};
use std::io::{self, Read};

/// Provides encoding and decoding of length-prefixed message frames.
///
/// A frame is laid out as:
///
/// ```text
/// [4-byte magic][4-byte body length][body]
/// ```
///
/// Both header fields are big-endian. The body is the `bitcode` serialization
/// of an [`RpcMessage`], so every header field, metadata entry and payload byte
/// survives a round trip.
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes an `RpcMessage` into a complete frame.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to be framed.
    ///
    /// # Returns
    ///
    /// The header followed by the serialized body, ready to be written to a
    /// byte stream in a single call.
    pub fn encode(message: &RpcMessage) -> Result<Vec<u8>, FrameEncodeError> {
        let body = bitcode::serialize(message)
            .map_err(|e| FrameEncodeError::PayloadSerializeFailed(e.to_string()))?;

        let body_len =
            u32::try_from(body.len()).map_err(|_| FrameEncodeError::BodyTooLarge(body.len()))?;

        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        buf.extend(&FRAME_MAGIC.to_be_bytes());
        buf.extend(&body_len.to_be_bytes());
        buf.extend(&body);

        Ok(buf)
    }

    /// Validates a frame header and returns the body length it announces.
    ///
    /// # Arguments
    ///
    /// * `header` - Exactly `FRAME_HEADER_SIZE` bytes read from the stream.
    /// * `max_body_len` - Largest body this side is willing to allocate for.
    pub fn decode_header(
        header: &[u8; FRAME_HEADER_SIZE],
        max_body_len: usize,
    ) -> Result<usize, FrameDecodeError> {
        let magic = u32::from_be_bytes(read_field(header, FRAME_MAGIC_OFFSET, FRAME_MAGIC_SIZE));
        if magic != FRAME_MAGIC {
            return Err(FrameDecodeError::MagicMismatch(magic));
        }

        let len = u32::from_be_bytes(read_field(
            header,
            FRAME_LENGTH_OFFSET,
            FRAME_LENGTH_FIELD_SIZE,
        )) as usize;

        if len > max_body_len {
            return Err(FrameDecodeError::BodyTooLarge {
                len,
                max: max_body_len,
            });
        }

        Ok(len)
    }

    /// Deserializes a frame body into a message.
    pub fn decode_body(body: &[u8]) -> Result<RpcMessage, FrameDecodeError> {
        bitcode::deserialize(body).map_err(|e| FrameDecodeError::BodyDecodeFailed(e.to_string()))
    }

    /// Decodes the first complete frame at the start of `buf`.
    ///
    /// # Returns
    ///
    /// The message together with the number of bytes it occupied, so callers
    /// holding several frames in one buffer can advance past it.
    pub fn decode(buf: &[u8], max_body_len: usize) -> Result<(RpcMessage, usize), FrameDecodeError> {
        let header: &[u8; FRAME_HEADER_SIZE] = buf
            .get(..FRAME_HEADER_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(FrameDecodeError::ShortRead {
                read: buf.len(),
                expected: FRAME_HEADER_SIZE,
            })?;

        let body_len = Self::decode_header(header, max_body_len)?;
        let frame_len = FRAME_HEADER_SIZE + body_len;

        let body = buf
            .get(FRAME_HEADER_SIZE..frame_len)
            .ok_or(FrameDecodeError::ShortRead {
                read: buf.len(),
                expected: frame_len,
            })?;

        Ok((Self::decode_body(body)?, frame_len))
    }

    /// Reads exactly one frame from a blocking reader.
    pub fn read_from<R: Read>(reader: &mut R, max_body_len: usize) -> Result<RpcMessage, FrameDecodeError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let read = read_fully(reader, &mut header)?;
        match read {
            0 => return Err(FrameDecodeError::ConnectionClosed),
            n if n < FRAME_HEADER_SIZE => {
                return Err(FrameDecodeError::ShortRead {
                    read: n,
                    expected: FRAME_HEADER_SIZE,
                });
            }
            _ => {}
        }

        let body_len = Self::decode_header(&header, max_body_len)?;
        let mut body = vec![0u8; body_len];
        let read = read_fully(reader, &mut body)?;
        if read < body_len {
            return Err(FrameDecodeError::ShortRead {
                read: FRAME_HEADER_SIZE + read,
                expected: FRAME_HEADER_SIZE + body_len,
            });
        }

        Self::decode_body(&body)
    }
}

fn read_field(header: &[u8; FRAME_HEADER_SIZE], offset: usize, size: usize) -> [u8; 4] {
    let mut field = [0u8; 4];
    field.copy_from_slice(&header[offset..offset + size]);
    field
}

/// Fills `buf` until it is full or the reader reports EOF.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
