//! # Submission server module
//!
//! Every connection runs through a small state machine built with enums and
//! matching: read one message, hand it to a [`MailSink`], write back one
//! byte, close.

mod app;
mod sink;
mod spool;
pub mod state_machine;

pub use app::Server;
pub use sink::{DeliveryError, FixedSink, MailSink};
pub use spool::{SpoolSink, SpooledAttachment, SpooledEnvelope};
pub use state_machine::SessionLimits;
