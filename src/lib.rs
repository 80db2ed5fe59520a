//! # mailsubmit
//!
//! A private, point-to-point mail submission protocol: the [`Client`] sends
//! one [`Message`] per TCP connection using explicit, versioned binary
//! framing and gets back a single success byte; the [`server`] module
//! decodes it, hands it to a delivery sink and answers.
//!
//! No authentication, no encryption, no SMTP. Put it behind something that
//! provides transport security if it leaves the machine.
//!
//! ```no_run
//! # async fn run() -> mailsubmit::errors::Result<()> {
//! use mailsubmit::Client;
//!
//! let client = Client::new("mail.internal", 6543)?;
//! if client.send_simple_mail("a@x.com", "b@x.com", "Hi", "Body").await? {
//!     println!("delivered");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod server;
pub mod time;
pub mod tracing;
pub mod wire;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use errors::{MailError, Result};
pub use models::{Attachment, Message};
