//! Async framing on top of any tokio reader/writer.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::errors::{MailError, Result};
use crate::models::Message;
use crate::wire::codec::{decode_frame, decode_response, encode_message, encode_response, Frame};

const READ_CHUNK: usize = 64 * 1024;

/// Encodes `message` and writes the whole frame.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_message(message)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| MailError::transport("writing message", e))?;
    writer
        .flush()
        .await
        .map_err(|e| MailError::transport("flushing message", e))?;

    Ok(frame.len())
}

/// Reads until one complete message has arrived, buffering at most
/// `max_size` bytes.
///
/// A peer that hangs up before sending anything is a transport failure; one
/// that hangs up halfway through a frame sent a malformed message.
pub async fn read_message<R>(reader: &mut R, max_size: usize) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut needed = 0;

    loop {
        buf.reserve(READ_CHUNK);
        let n = reader
            .read_buf(&mut buf)
            .await
            .map_err(|e| MailError::transport("reading message", e))?;

        if n == 0 {
            if buf.is_empty() {
                return Err(MailError::transport(
                    "reading message",
                    "connection closed before any bytes arrived",
                ));
            }
            return Err(MailError::malformed(format!(
                "connection closed mid-message after {} bytes",
                buf.len()
            )));
        }

        if buf.len() > max_size {
            return Err(too_big(buf.len() as u64, max_size));
        }
        // The frame can't be complete yet, no point parsing it again
        if buf.len() < needed {
            continue;
        }

        match decode_frame(&buf)? {
            Frame::Complete(message, consumed) => {
                if consumed < buf.len() {
                    debug!("Ignoring {} bytes after the message", buf.len() - consumed);
                }
                return Ok(message);
            }
            Frame::Partial { needed: at_least } => {
                if at_least > max_size {
                    return Err(too_big(at_least as u64, max_size));
                }
                needed = at_least;
            }
        }
    }
}

fn too_big(size: u64, max_size: usize) -> MailError {
    MailError::ResourceLimit {
        what: "incoming message".to_owned(),
        size,
        limit: max_size as u64,
    }
}

pub async fn write_response<W>(writer: &mut W, delivered: bool) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_u8(encode_response(delivered))
        .await
        .map_err(|e| MailError::transport("writing response", e))?;
    writer
        .flush()
        .await
        .map_err(|e| MailError::transport("flushing response", e))
}

/// Reads the single response byte.
pub async fn read_response<R>(reader: &mut R) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    let byte = reader
        .read_u8()
        .await
        .map_err(|e| MailError::transport("reading response", e))?;
    decode_response(byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;
    use tokio::io::duplex;

    fn sample() -> Message {
        let mut message = Message::simple("a@x.com", "b@x.com", "Hi", "Body").unwrap();
        message.attach(Attachment::from_bytes("big.bin", vec![0xab; 200_000]).unwrap());
        message
    }

    #[tokio::test]
    async fn message_crosses_a_pipe_in_small_chunks() {
        // A tiny pipe forces many partial reads
        let (mut client, mut server) = duplex(97);
        let message = sample();

        let expected = message.clone();
        let writer = tokio::spawn(async move { write_message(&mut client, &message).await });

        let received = read_message(&mut server, 1024 * 1024).await.unwrap();
        let written = writer.await.unwrap().unwrap();

        assert_eq!(received, expected);
        assert_eq!(written, encode_message(&expected).unwrap().len());
    }

    #[tokio::test]
    async fn early_hangup_is_transport_failure() {
        let (client, mut server) = duplex(64);
        drop(client);

        let err = read_message(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, MailError::Transport { .. }));
    }

    #[tokio::test]
    async fn hangup_mid_frame_is_malformed() {
        let (mut client, mut server) = duplex(1024);
        let frame = encode_message(&sample()).unwrap();
        client.write_all(&frame[..10]).await.unwrap();
        drop(client);

        let err = read_message(&mut server, 1024 * 1024).await.unwrap_err();
        assert!(matches!(err, MailError::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn oversized_stream_is_refused() {
        let (mut client, mut server) = duplex(1024 * 1024);
        let frame = encode_message(&sample()).unwrap();
        client.write_all(&frame).await.unwrap();

        let err = read_message(&mut server, 4096).await.unwrap_err();
        assert!(matches!(err, MailError::ResourceLimit { limit: 4096, .. }));
    }

    #[tokio::test]
    async fn oversized_frame_in_one_read_is_refused() {
        let (mut client, mut server) = duplex(4096);
        let message = Message::simple("a@x.com", "b@x.com", "Hi", "Body").unwrap();
        let frame = encode_message(&message).unwrap();
        assert!(frame.len() > 32);
        client.write_all(&frame).await.unwrap();

        let err = read_message(&mut server, 32).await.unwrap_err();
        assert!(matches!(err, MailError::ResourceLimit { limit: 32, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn declared_length_over_limit_fails_without_waiting() {
        let (mut client, mut server) = duplex(64);
        // Version, then a sender claiming 1 MiB; the rest never arrives
        client.write_all(&[1, 0, 0x10, 0, 0]).await.unwrap();

        let err = read_message(&mut server, 4096).await.unwrap_err();
        assert!(
            matches!(err, MailError::ResourceLimit { size, limit: 4096, .. } if size > 1 << 20),
            "{:?}",
            err
        );
        drop(client);
    }

    #[tokio::test]
    async fn bad_version_is_reported_from_the_stream() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[42, 0, 0]).await.unwrap();

        let err = read_message(&mut server, 1024).await.unwrap_err();
        assert!(matches!(err, MailError::ProtocolVersion { found: 42, .. }));
    }

    #[tokio::test]
    async fn response_round_trip() {
        let (mut client, mut server) = duplex(8);
        write_response(&mut server, true).await.unwrap();
        write_response(&mut server, false).await.unwrap();
        server.write_u8(5).await.unwrap();

        assert!(read_response(&mut client).await.unwrap());
        assert!(!read_response(&mut client).await.unwrap());
        assert!(matches!(
            read_response(&mut client).await,
            Err(MailError::MalformedMessage(_))
        ));

        drop(server);
        assert!(matches!(
            read_response(&mut client).await,
            Err(MailError::Transport { .. })
        ));
    }
}
