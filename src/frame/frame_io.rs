use crate::{
    constants::FRAME_HEADER_SIZE,
    frame::{FrameCodec, FrameDecodeError},
    rpc::RpcMessage,
};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads exactly one frame from an async byte stream.
///
/// A stream that ends before the first header byte yields
/// `FrameDecodeError::ConnectionClosed`; one that ends anywhere later yields
/// `FrameDecodeError::ShortRead`. No partial message is ever returned.
pub async fn read_frame<R>(reader: &mut R, max_body_len: usize) -> Result<RpcMessage, FrameDecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        match reader.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Err(FrameDecodeError::ConnectionClosed),
            0 => {
                return Err(FrameDecodeError::ShortRead {
                    read: filled,
                    expected: FRAME_HEADER_SIZE,
                });
            }
            n => filled += n,
        }
    }

    let body_len = FrameCodec::decode_header(&header, max_body_len)?;

    let mut body = vec![0u8; body_len];
    let mut filled = 0;
    while filled < body_len {
        match reader.read(&mut body[filled..]).await? {
            0 => {
                return Err(FrameDecodeError::ShortRead {
                    read: FRAME_HEADER_SIZE + filled,
                    expected: FRAME_HEADER_SIZE + body_len,
                });
            }
            n => filled += n,
        }
    }

    FrameCodec::decode_body(&body)
}

/// Writes an already encoded frame and flushes it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_MAX_FRAME_BODY_SIZE;

    #[tokio::test]
    async fn reads_back_written_frames_in_order() {
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            for sequence in 0..3 {
                let mut message = RpcMessage::request(sequence, "Arith", "Add");
                message.payload = vec![sequence as u8; 100];
                let frame = FrameCodec::encode(&message).unwrap();
                write_frame(&mut client, &frame).await.unwrap();
            }
        });

        for sequence in 0..3 {
            let message = read_frame(&mut server, DEFAULT_MAX_FRAME_BODY_SIZE).await.unwrap();
            assert_eq!(message.sequence, sequence);
            assert_eq!(message.payload, vec![sequence as u8; 100]);
        }
        writer.await.unwrap();

        assert!(matches!(
            read_frame(&mut server, DEFAULT_MAX_FRAME_BODY_SIZE).await,
            Err(FrameDecodeError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn truncated_frame_is_a_short_read() {
        let frame = FrameCodec::encode(&RpcMessage::request(1, "Echo", "Echo")).unwrap();
        let mut truncated = &frame[..frame.len() - 1];

        let result = read_frame(&mut truncated, DEFAULT_MAX_FRAME_BODY_SIZE).await;

        match result {
            Err(FrameDecodeError::ShortRead { read, expected }) => {
                assert_eq!(read, frame.len() - 1);
                assert_eq!(expected, frame.len());
            }
            other => panic!("expected a short read, got {other:?}"),
        }
    }
}
