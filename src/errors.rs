//! # Error taxonomy
//!
//! Every way a submission can go wrong maps to exactly one [`MailError`]
//! variant, so callers can tell "couldn't reach the server" apart from "the
//! server said no" (the latter is `Ok(false)`, never an error).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MailError>;

#[derive(Debug, Error)]
pub enum MailError {
    /// A message field is malformed; fixable by the caller before sending.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// An attachment couldn't be read from disk.
    #[error("couldn't read attachment {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{what} is {size} bytes, over the {limit} byte limit")]
    ResourceLimit { what: String, size: u64, limit: u64 },

    #[error("couldn't resolve host {host}: {reason}")]
    HostResolution { host: String, reason: String },

    #[error("couldn't connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// I/O failure once the connection is up.
    #[error("transport failure while {stage}: {reason}")]
    Transport { stage: &'static str, reason: String },

    #[error("unsupported protocol version {found} (expected {expected})")]
    ProtocolVersion { found: u8, expected: u8 },

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

impl MailError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        MailError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(stage: &'static str, err: impl std::fmt::Display) -> Self {
        MailError::Transport {
            stage,
            reason: err.to_string(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        MailError::MalformedMessage(reason.into())
    }
}
