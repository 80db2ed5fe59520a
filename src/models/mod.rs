//! # Data model
//!
//! The [`Message`] handed to the client and decoded by the server, plus the
//! address checks both sides rely on.

mod address;
mod message;

pub use address::is_plausible_address;
pub(crate) use message::base_name;
pub use message::{Attachment, Message};
