use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::Message;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("message has no recipients")]
    NoRecipients,
    #[error("{0:?} is not a usable attachment name")]
    BadAttachmentName(String),
    #[error("couldn't write {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("couldn't serialize the envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    #[error("delivery refused: {0}")]
    Refused(String),
}

/// Where accepted messages go. `Ok` makes the server answer `1`, any error
/// makes it answer `0`.
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Accepts or refuses everything, without storing anything.
#[derive(Debug, Clone, Copy)]
pub struct FixedSink {
    accept: bool,
}

impl FixedSink {
    pub fn accepting() -> Self {
        Self { accept: true }
    }

    pub fn refusing() -> Self {
        Self { accept: false }
    }
}

#[async_trait]
impl MailSink for FixedSink {
    async fn deliver(&self, _message: &Message) -> Result<(), DeliveryError> {
        if self.accept {
            Ok(())
        } else {
            Err(DeliveryError::Refused("sink is configured to refuse".to_owned()))
        }
    }
}
