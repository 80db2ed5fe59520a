use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::DEFAULT_MAX_ATTACHMENT_SIZE;
use crate::errors::{MailError, Result};
use crate::models::address;

/// A file carried along with a [`Message`]. The content is read when the
/// attachment is created, never at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content: Vec<u8>,
}

impl Attachment {
    /// Wraps bytes the caller already holds. Only the final component of
    /// `filename` is kept, so `../../etc/passwd` becomes `passwd`.
    pub fn from_bytes(filename: &str, content: Vec<u8>) -> Result<Self> {
        let filename = base_name(filename)
            .ok_or_else(|| MailError::validation("attachment filename", "filename is empty"))?;

        Ok(Self { filename, content })
    }

    /// Reads `path` fully into memory, refusing files over `max_size` bytes.
    pub fn from_path(path: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| MailError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = fs::metadata(path).map_err(io_err)?.len();
        if size > max_size {
            return Err(MailError::ResourceLimit {
                what: format!("attachment {}", path.display()),
                size,
                limit: max_size,
            });
        }

        let content = fs::read(path).map_err(io_err)?;
        // The file may have grown between stat and read
        if content.len() as u64 > max_size {
            return Err(MailError::ResourceLimit {
                what: format!("attachment {}", path.display()),
                size: content.len() as u64,
                limit: max_size,
            });
        }

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(base_name)
            .ok_or_else(|| {
                MailError::validation(
                    "attachment filename",
                    format!("{} has no usable file name", path.display()),
                )
            })?;

        debug!("Read attachment {} ({} bytes)", filename, content.len());

        Ok(Self { filename, content })
    }

    pub(crate) fn from_wire(filename: String, content: Vec<u8>) -> Self {
        Self { filename, content }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Last path component of `name`, or `None` if nothing usable is left.
pub(crate) fn base_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();

    match base {
        "" | "." | ".." => None,
        base => Some(base.to_owned()),
    }
}

/// The sender/recipients/subject/body/attachments bundle submitted for
/// delivery.
///
/// Fields are only reachable through checked methods, so a `Message` built
/// here always has a plausible sender and plausible recipients. Sending
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: String,
    subject: String,
    body: String,
    recipients: Vec<String>,
    attachments: Vec<Attachment>,
}

impl Message {
    /// A message with no recipients or attachments yet.
    ///
    /// ```
    /// # use mailsubmit::models::Message;
    /// let mut message = Message::build("jane@example.com", "Hi", "Body").unwrap();
    /// message.add_recipient("john@example.com").unwrap();
    /// assert_eq!(message.recipients(), ["john@example.com"]);
    ///
    /// assert!(Message::build("", "Hi", "Body").is_err());
    /// ```
    pub fn build(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self> {
        let sender = sender.into();
        address::validate("sender", &sender)?;

        Ok(Self {
            sender,
            subject: subject.into(),
            body: body.into(),
            recipients: Vec::new(),
            attachments: Vec::new(),
        })
    }

    /// One sender, one recipient, no attachments.
    pub fn simple(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self> {
        let mut message = Self::build(sender, subject, body)?;
        message.add_recipient(recipient)?;
        Ok(message)
    }

    /// Like [`Message::simple`], plus the file at `path`.
    pub fn simple_with_attachment(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        path: impl AsRef<Path>,
        max_attachment_size: u64,
    ) -> Result<Self> {
        let mut message = Self::simple(sender, recipient, subject, body)?;
        message.add_attachment_with_limit(path, max_attachment_size)?;
        Ok(message)
    }

    pub fn add_recipient(&mut self, address: impl Into<String>) -> Result<()> {
        let address = address.into();
        address::validate("recipient", &address)?;
        self.recipients.push(address);
        Ok(())
    }

    /// Reads the file now, capped at [`DEFAULT_MAX_ATTACHMENT_SIZE`].
    pub fn add_attachment(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.add_attachment_with_limit(path, DEFAULT_MAX_ATTACHMENT_SIZE)
    }

    pub fn add_attachment_with_limit(&mut self, path: impl AsRef<Path>, max_size: u64) -> Result<()> {
        let attachment = Attachment::from_path(path, max_size)?;
        self.attachments.push(attachment);
        Ok(())
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    /// Fails unless the message has somewhere to go.
    pub fn ensure_sendable(&self) -> Result<()> {
        if self.recipients.is_empty() {
            return Err(MailError::validation(
                "recipients",
                "at least one recipient is required",
            ));
        }
        Ok(())
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Reassembles a message straight off the wire. No address checks here:
    /// framing is the codec's job, policy is the receiver's.
    pub(crate) fn from_wire(
        sender: String,
        subject: String,
        body: String,
        recipients: Vec<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            sender,
            subject,
            body,
            recipients,
            attachments,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message {{ from: {}, to: {}, subject: {}, attachments: {} }}",
            self.sender,
            self.recipients.join(", "),
            self.subject,
            self.attachments.len()
        )
    }
}
