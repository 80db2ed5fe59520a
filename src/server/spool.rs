//! # Spool directory delivery
//!
//! Each accepted message gets its own directory under the spool root:
//!
//! ```text
//! spool/
//!   20211201T120103.042Z-k3j9x0qa/
//!     envelope.json
//!     body.txt
//!     attachments/
//!       01-report.pdf
//! ```
//!
//! Entries are written under a `.partial` name and renamed into place once
//! complete, so anything without the suffix is safe to pick up.

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::models::{base_name, Message};
use crate::server::sink::{DeliveryError, MailSink};
use crate::time::{rfc3339, spool_stamp};

/// What lands in `envelope.json`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpooledEnvelope {
    pub id: String,
    pub received_at: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub attachments: Vec<SpooledAttachment>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpooledAttachment {
    pub filename: String,
    /// Name under `attachments/`, prefixed with its position so that two
    /// attachments with the same name don't collide.
    pub stored_as: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct SpoolSink {
    root: PathBuf,
}

impl SpoolSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn new_entry_id() -> String {
        let suffix = Alphanumeric
            .sample_string(&mut rand::thread_rng(), 8)
            .to_lowercase();
        format!("{}-{}", spool_stamp(&Utc::now()), suffix)
    }

    async fn write_entry(
        &self,
        dir: &Path,
        id: &str,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let attachments_dir = dir.join("attachments");
        fs::create_dir_all(&attachments_dir)
            .await
            .map_err(storage(&attachments_dir))?;

        let mut stored = Vec::with_capacity(message.attachments().len());
        for (i, attachment) in message.attachments().iter().enumerate() {
            let stored_as = format!("{:02}-{}", i + 1, attachment.filename());
            let path = attachments_dir.join(&stored_as);
            fs::write(&path, attachment.content())
                .await
                .map_err(storage(&path))?;

            stored.push(SpooledAttachment {
                filename: attachment.filename().to_owned(),
                stored_as,
                size: attachment.len() as u64,
            });
        }

        let body_path = dir.join("body.txt");
        fs::write(&body_path, message.body())
            .await
            .map_err(storage(&body_path))?;

        let envelope = SpooledEnvelope {
            id: id.to_owned(),
            received_at: rfc3339(&Utc::now()),
            sender: message.sender().to_owned(),
            recipients: message.recipients().to_vec(),
            subject: message.subject().to_owned(),
            attachments: stored,
        };
        let envelope_path = dir.join("envelope.json");
        fs::write(&envelope_path, serde_json::to_vec_pretty(&envelope)?)
            .await
            .map_err(storage(&envelope_path))?;

        Ok(())
    }
}

fn storage(path: &Path) -> impl FnOnce(std::io::Error) -> DeliveryError + '_ {
    move |source| DeliveryError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

/// Moves a finished entry to its final name.
async fn commit(partial: &Path, done: &Path) -> Result<(), DeliveryError> {
    fs::rename(partial, done).await.map_err(storage(done))
}

async fn discard(partial: &Path) {
    if let Err(e) = fs::remove_dir_all(partial).await {
        warn!("Couldn't clean up {}: {}", partial.display(), e);
    }
}

#[async_trait]
impl MailSink for SpoolSink {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        if message.recipients().is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        // Names come off the wire, so they get the same treatment as local ones
        for attachment in message.attachments() {
            if base_name(attachment.filename()).as_deref() != Some(attachment.filename()) {
                return Err(DeliveryError::BadAttachmentName(
                    attachment.filename().to_owned(),
                ));
            }
        }

        let id = Self::new_entry_id();
        let partial = self.root.join(format!("{}.partial", id));
        let done = self.root.join(&id);

        debug!("Spooling {} into {}", message, partial.display());

        let written = match self.write_entry(&partial, &id, message).await {
            Ok(()) => commit(&partial, &done).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            discard(&partial).await;
            return Err(e);
        }

        info!("Spooled message {} from {}", id, message.sender());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;

    fn entries(root: &Path) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        found.sort();
        found
    }

    #[tokio::test]
    async fn spools_body_envelope_and_attachments() {
        let root = tempfile::tempdir().unwrap();
        let sink = SpoolSink::new(root.path().join("spool"));

        let mut message = Message::simple("a@x.com", "b@x.com", "Hi", "Body").unwrap();
        message.add_recipient("c@x.com").unwrap();
        message.attach(Attachment::from_bytes("data.bin", vec![0, 1, 2, 255]).unwrap());
        message.attach(Attachment::from_bytes("data.bin", vec![9]).unwrap());

        sink.deliver(&message).await.unwrap();

        let spooled = entries(sink.root());
        assert_eq!(spooled.len(), 1);
        let entry = &spooled[0];
        assert!(!entry.to_string_lossy().ends_with(".partial"));

        assert_eq!(std::fs::read_to_string(entry.join("body.txt")).unwrap(), "Body");
        assert_eq!(
            std::fs::read(entry.join("attachments/01-data.bin")).unwrap(),
            vec![0, 1, 2, 255]
        );
        assert_eq!(std::fs::read(entry.join("attachments/02-data.bin")).unwrap(), vec![9]);

        let envelope: SpooledEnvelope =
            serde_json::from_slice(&std::fs::read(entry.join("envelope.json")).unwrap()).unwrap();
        assert_eq!(envelope.sender, "a@x.com");
        assert_eq!(envelope.recipients, ["b@x.com", "c@x.com"]);
        assert_eq!(envelope.subject, "Hi");
        assert_eq!(envelope.attachments.len(), 2);
        assert_eq!(envelope.attachments[0].size, 4);
        assert_eq!(entry.file_name().unwrap().to_str().unwrap(), envelope.id);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_partial_entry() {
        let root = tempfile::tempdir().unwrap();
        let sink = SpoolSink::new(root.path());
        let mut message = Message::simple("a@x.com", "b@x.com", "Hi", "Body").unwrap();
        message.attach(Attachment::from_bytes("data.bin", vec![1, 2, 3]).unwrap());

        let partial = root.path().join("entry.partial");
        let done = root.path().join("entry");
        // A non-empty directory can't be renamed over
        std::fs::create_dir_all(done.join("taken")).unwrap();

        sink.write_entry(&partial, "entry", &message).await.unwrap();
        let err = commit(&partial, &done).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Storage { .. }));

        discard(&partial).await;
        assert_eq!(entries(root.path()), vec![done]);
    }

    #[tokio::test]
    async fn refuses_messages_without_recipients() {
        let root = tempfile::tempdir().unwrap();
        let sink = SpoolSink::new(root.path());

        let message = Message::build("a@x.com", "Hi", "Body").unwrap();
        let err = sink.deliver(&message).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NoRecipients));
        assert!(entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn refuses_path_like_attachment_names() {
        let root = tempfile::tempdir().unwrap();
        let sink = SpoolSink::new(root.path());

        let mut message = Message::simple("a@x.com", "b@x.com", "Hi", "Body").unwrap();
        message.attach(Attachment::from_wire("../escape".to_owned(), vec![1]));

        let err = sink.deliver(&message).await.unwrap_err();
        assert!(matches!(err, DeliveryError::BadAttachmentName(name) if name == "../escape"));
        assert!(entries(root.path()).is_empty());
    }
}
