use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::ServerConfig;
use crate::server::sink::MailSink;
use crate::server::state_machine::{run_session, SessionLimits};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and runs one session per connection on its own task.
pub struct Server {
    sink: Arc<dyn MailSink>,
    limits: SessionLimits,
}

impl Server {
    pub fn new(sink: Arc<dyn MailSink>, limits: SessionLimits) -> Self {
        Self { sink, limits }
    }

    pub fn from_config(sink: Arc<dyn MailSink>, config: &ServerConfig) -> Self {
        Self::new(
            sink,
            SessionLimits {
                read_timeout: config.read_timeout,
                write_timeout: config.write_timeout,
                max_message_size: config.max_message_size,
            },
        )
    }

    /// Runs forever. Accept and per-connection failures are logged and never
    /// stop the loop.
    pub async fn serve(&self, listener: &TcpListener) -> std::io::Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    // Usually EMFILE or a connection reset before accept;
                    // back off briefly instead of spinning
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let sink = Arc::clone(&self.sink);
            let limits = self.limits;
            tokio::spawn(
                async move {
                    let delivered = serve_connection(socket, sink.as_ref(), &limits).await;
                    debug!("Session finished, delivered: {}", delivered);
                }
                .instrument(info_span!("session", %peer)),
            );
        }
    }
}

async fn serve_connection(mut socket: TcpStream, sink: &dyn MailSink, limits: &SessionLimits) -> bool {
    let delivered = run_session(&mut socket, sink, limits).await;
    if let Err(e) = socket.shutdown().await {
        debug!("Shutdown failed: {}", e);
    }
    delivered
}
