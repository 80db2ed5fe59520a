//! Message and response framing.
//!
//! ```text
//! u8   version (= PROTOCOL_VERSION)
//! str  sender
//! str  subject
//! str  body
//! u32  recipient count, then that many `str`
//! u32  attachment count, then per attachment:
//!        str  filename
//!        u64  content length, then the raw bytes
//!
//! str  = u32 byte length + UTF-8 bytes
//! ```
//!
//! Every integer is big-endian. The response is a single byte: `1` delivered,
//! `0` rejected.

use crate::errors::{MailError, Result};
use crate::models::{Attachment, Message};

pub const PROTOCOL_VERSION: u8 = 1;

pub const RESPONSE_SUCCESS: u8 = 1;
pub const RESPONSE_FAILURE: u8 = 0;

/// Serializes `message` into one contiguous frame.
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(message));

    out.push(PROTOCOL_VERSION);
    put_str(&mut out, "sender", message.sender())?;
    put_str(&mut out, "subject", message.subject())?;
    put_str(&mut out, "body", message.body())?;

    put_count(&mut out, "recipient list", message.recipients().len())?;
    for recipient in message.recipients() {
        put_str(&mut out, "recipient", recipient)?;
    }

    put_count(&mut out, "attachment list", message.attachments().len())?;
    for attachment in message.attachments() {
        put_str(&mut out, "attachment filename", attachment.filename())?;
        out.extend_from_slice(&(attachment.len() as u64).to_be_bytes());
        out.extend_from_slice(attachment.content());
    }

    Ok(out)
}

/// Decodes a buffer holding exactly one frame. Missing bytes and leftover
/// bytes are both [`MailError::MalformedMessage`].
pub fn decode_message(buf: &[u8]) -> Result<Message> {
    match try_decode_message(buf)? {
        Some((message, consumed)) if consumed == buf.len() => Ok(message),
        Some((_, consumed)) => Err(MailError::malformed(format!(
            "{} trailing bytes after the message",
            buf.len() - consumed
        ))),
        None => Err(MailError::malformed(
            "message is truncated: a declared length runs past the end of the input",
        )),
    }
}

/// Decodes one frame from the front of `buf`.
///
/// `Ok(None)` means `buf` is a valid prefix that needs more bytes. On success
/// the second value is how many bytes the frame used.
pub fn try_decode_message(buf: &[u8]) -> Result<Option<(Message, usize)>> {
    match decode_frame(buf)? {
        Frame::Complete(message, consumed) => Ok(Some((message, consumed))),
        Frame::Partial { .. } => Ok(None),
    }
}

pub(crate) enum Frame {
    Complete(Message, usize),
    /// The frame is at least `needed` bytes long.
    Partial { needed: usize },
}

pub(crate) fn decode_frame(buf: &[u8]) -> Result<Frame> {
    let mut reader = Reader::new(buf);

    // Each `?` bails on a hard error, each `need!` on "not enough bytes yet"
    macro_rules! need {
        ($e:expr) => {
            match $e {
                Some(value) => value,
                None => return Ok(Frame::Partial { needed: reader.wanted }),
            }
        };
    }

    let version = need!(reader.u8());
    if version != PROTOCOL_VERSION {
        return Err(MailError::ProtocolVersion {
            found: version,
            expected: PROTOCOL_VERSION,
        });
    }

    let sender = need!(reader.string("sender")?);
    let subject = need!(reader.string("subject")?);
    let body = need!(reader.string("body")?);

    let recipient_count = need!(reader.u32());
    let mut recipients = Vec::with_capacity(reader.capacity_hint(recipient_count, 4));
    for _ in 0..recipient_count {
        recipients.push(need!(reader.string("recipient")?));
    }

    let attachment_count = need!(reader.u32());
    let mut attachments = Vec::with_capacity(reader.capacity_hint(attachment_count, 12));
    for _ in 0..attachment_count {
        let filename = need!(reader.string("attachment filename")?);
        let len = need!(reader.u64());
        let content = need!(reader.bytes_u64(len));
        attachments.push(Attachment::from_wire(filename, content.to_vec()));
    }

    let message = Message::from_wire(sender, subject, body, recipients, attachments);
    Ok(Frame::Complete(message, reader.position()))
}

pub fn encode_response(delivered: bool) -> u8 {
    if delivered {
        RESPONSE_SUCCESS
    } else {
        RESPONSE_FAILURE
    }
}

pub fn decode_response(byte: u8) -> Result<bool> {
    match byte {
        RESPONSE_SUCCESS => Ok(true),
        RESPONSE_FAILURE => Ok(false),
        other => Err(MailError::malformed(format!(
            "response byte must be 0 or 1, got {}",
            other
        ))),
    }
}

fn encoded_len(message: &Message) -> usize {
    let strings = message.sender().len()
        + message.subject().len()
        + message.body().len()
        + message.recipients().iter().map(|r| 4 + r.len()).sum::<usize>();
    let attachments: usize = message
        .attachments()
        .iter()
        .map(|a| 4 + a.filename().len() + 8 + a.len())
        .sum();

    1 + 12 + 8 + strings + attachments
}

fn put_count(out: &mut Vec<u8>, what: &str, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| MailError::ResourceLimit {
        what: what.to_owned(),
        size: count as u64,
        limit: u32::MAX as u64,
    })?;
    out.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

fn put_str(out: &mut Vec<u8>, what: &str, value: &str) -> Result<()> {
    put_count(out, what, value.len())?;
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Bounds-checked cursor. Every read returns `None` instead of running past
/// the end of the buffer, and records in `wanted` how long the buffer would
/// have had to be.
struct Reader<'a> {
    buffer: &'a [u8],
    read_pos: usize,
    wanted: usize,
}

impl<'a> Reader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
            wanted: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    fn position(&self) -> usize {
        self.read_pos
    }

    /// Never trust a declared count for preallocation beyond what the
    /// remaining bytes could possibly hold.
    fn capacity_hint(&self, count: u32, min_item_size: usize) -> usize {
        (count as usize).min(self.remaining() / min_item_size)
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            self.wanted = self.read_pos.saturating_add(len);
            return None;
        }
        let start = self.read_pos;
        self.read_pos += len;
        Some(&self.buffer[start..self.read_pos])
    }

    fn bytes_u64(&mut self, len: u64) -> Option<&'a [u8]> {
        // A length that doesn't fit in usize can't fit in the buffer either
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        self.bytes(len)
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Some(out)
    }

    fn u8(&mut self) -> Option<u8> {
        self.array::<1>().map(|[b]| b)
    }

    fn u32(&mut self) -> Option<u32> {
        self.array().map(u32::from_be_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.array().map(u64::from_be_bytes)
    }

    fn string(&mut self, what: &str) -> Result<Option<String>> {
        let len = match self.u32() {
            Some(len) => len as usize,
            None => return Ok(None),
        };
        let raw = match self.bytes(len) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        std::str::from_utf8(raw)
            .map(|s| Some(s.to_owned()))
            .map_err(|e| MailError::malformed(format!("{} is not valid UTF-8: {}", what, e)))
    }
}
