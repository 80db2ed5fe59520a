use std::error::Error;
use std::sync::Arc;

use mailsubmit::config::ServerConfig;
use mailsubmit::server::{Server, SpoolSink};
use mailsubmit::tracing::setup_tracing;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing("info")?;

    let config = ServerConfig::from_env()?;
    info!(
        "Spooling to {}, max message size {} bytes",
        config.spool_dir.display(),
        config.max_message_size
    );

    let sink = Arc::new(SpoolSink::new(&config.spool_dir));
    let server = Server::from_config(sink, &config);
    let listener = TcpListener::bind(config.bind).await?;

    tokio::select! {
        res = server.serve(&listener) => {
            error!("Submission service exited prematurely");
            res?;
        }
        _ = signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    Ok(())
}
