//! # Submission client
//!
//! One call, one connection: resolve, connect, write the message, read the
//! response byte, close. No pooling and no retries. The socket lives inside
//! the call, so every return path (and dropping the future) closes it.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::{MailError, Result};
use crate::models::Message;
use crate::wire::{read_response, write_message};

/// Holds nothing but configuration, so it's cheap to clone and safe to share
/// between tasks.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    /// A client for `host:port` with default timeouts and limits.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::with_config(ClientConfig::new(host, port))
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(MailError::validation("host", "host is empty"));
        }
        if config.port == 0 {
            return Err(MailError::validation(
                "port",
                "port must be between 1 and 65535",
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a one-recipient message without attachments.
    pub async fn send_simple_mail(
        &self,
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<bool> {
        let message = Message::simple(sender, recipient, subject, body)?;
        self.send_mail(message).await
    }

    /// Same as [`Client::send_simple_mail`] with one attachment. The file is
    /// read (and size-checked) before any connection is opened.
    pub async fn send_simple_attachment_mail(
        &self,
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
        file_path: impl AsRef<Path>,
    ) -> Result<bool> {
        let message = Message::simple_with_attachment(
            sender,
            recipient,
            subject,
            body,
            file_path,
            self.config.max_attachment_size,
        )?;
        self.send_mail(message).await
    }

    /// Submits `message` and returns what the server said.
    ///
    /// `Ok(false)` is reserved for an explicit, well-formed rejection from the
    /// server. Anything that goes wrong on the way is an `Err`.
    pub async fn send_mail(&self, message: Message) -> Result<bool> {
        message.ensure_sendable()?;
        self.check_attachment_sizes(&message)?;

        let addrs = self.resolve().await?;
        let mut stream = self.connect(&addrs).await?;

        let written = with_deadline(
            self.config.write_timeout,
            "writing message",
            write_message(&mut stream, &message),
        )
        .await?;
        debug!("Wrote {} bytes for {}", written, message);
        drop(message);

        let delivered = with_deadline(
            self.config.read_timeout,
            "reading response",
            read_response(&mut stream),
        )
        .await?;

        // Best effort: the answer is already in hand, and the socket is
        // closed on drop either way.
        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown after response failed: {}", e);
        }

        if delivered {
            info!("Server accepted the message");
        } else {
            warn!("Server rejected the message");
        }
        Ok(delivered)
    }

    /// Attachments may have been built from bytes or under another limit, so
    /// the configured one is applied again here.
    fn check_attachment_sizes(&self, message: &Message) -> Result<()> {
        let limit = self.config.max_attachment_size;
        for attachment in message.attachments() {
            let size = attachment.len() as u64;
            if size > limit {
                return Err(MailError::ResourceLimit {
                    what: format!("attachment {}", attachment.filename()),
                    size,
                    limit,
                });
            }
        }
        Ok(())
    }

    async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let host = self.config.host.as_str();
        let resolution_failed = |reason: String| MailError::HostResolution {
            host: host.to_owned(),
            reason,
        };

        let lookup = timeout(
            self.config.connect_timeout,
            lookup_host((host, self.config.port)),
        )
        .await
        .map_err(|_| resolution_failed("lookup timed out".to_owned()))?
        .map_err(|e| resolution_failed(e.to_string()))?;

        let addrs: Vec<SocketAddr> = lookup.collect();
        if addrs.is_empty() {
            return Err(resolution_failed("no addresses found".to_owned()));
        }
        debug!("Resolved {} to {:?}", host, addrs);
        Ok(addrs)
    }

    /// Tries every resolved address in order, each under the connect timeout.
    async fn connect(&self, addrs: &[SocketAddr]) -> Result<TcpStream> {
        let mut last_failure = String::new();

        for addr in addrs {
            debug!("Connecting to {}", addr);
            match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Couldn't set TCP_NODELAY on {}: {}", addr, e);
                    }
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    debug!("Connection to {} failed: {}", addr, e);
                    last_failure = e.to_string();
                }
                Err(_) => {
                    debug!("Connection to {} timed out", addr);
                    last_failure = format!(
                        "timed out after {}ms",
                        self.config.connect_timeout.as_millis()
                    );
                }
            }
        }

        Err(MailError::Connection {
            addr: format!("{}:{}", self.config.host, self.config.port),
            reason: last_failure,
        })
    }
}

/// Runs `fut` under `limit`, turning expiry into a transport failure.
async fn with_deadline<T, F>(limit: Duration, stage: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout(limit, fut).await.map_err(|_| {
        MailError::transport(stage, format!("timed out after {}ms", limit.as_millis()))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;

    #[test]
    fn rejects_port_zero_and_empty_host() {
        assert!(matches!(
            Client::new("localhost", 0),
            Err(MailError::Validation { field: "port", .. })
        ));
        assert!(matches!(
            Client::new("  ", 25),
            Err(MailError::Validation { field: "host", .. })
        ));
        assert_eq!(Client::new("localhost", 65535).unwrap().config().port, 65535);
    }

    #[tokio::test]
    async fn message_without_recipients_never_connects() {
        // Port 9 on an unroutable documentation address: if we tried to
        // connect, this would be a Connection error instead.
        let client = Client::new("192.0.2.1", 9).unwrap();
        let message = Message::build("a@b.c", "s", "b").unwrap();

        let err = client.send_mail(message).await.unwrap_err();
        assert!(matches!(err, MailError::Validation { field: "recipients", .. }));
    }

    #[tokio::test]
    async fn attachment_over_configured_limit_never_connects() {
        let mut config = ClientConfig::new("192.0.2.1", 9);
        config.max_attachment_size = 16;
        let client = Client::with_config(config).unwrap();

        let mut message = Message::simple("a@b.c", "d@e.f", "s", "b").unwrap();
        message.attach(Attachment::from_bytes("big.bin", vec![0; 1 << 20]).unwrap());

        let err = client.send_mail(message).await.unwrap_err();
        assert!(
            matches!(err, MailError::ResourceLimit { size: 1048576, limit: 16, .. }),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn unresolvable_host_is_reported_as_such() {
        let client = Client::new("no-such-host.invalid", 6543).unwrap();
        let err = client
            .send_simple_mail("a@x.com", "b@x.com", "Hi", "Body")
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::HostResolution { .. }));
    }

    #[test]
    fn client_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Client>();
    }
}
