//! Submits one message from the command line.
//!
//! ```text
//! mailsubmit-send --from jane@example.com --to john@example.com \
//!     --subject "Report" --body "See attached" --attach report.pdf
//! ```
//!
//! Host, port, timeouts and the attachment limit come from the
//! `MAILSUBMIT_*` environment (or `.env`); `--host` and `--port` override.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mailsubmit::config::ClientConfig;
use mailsubmit::tracing::setup_tracing;
use mailsubmit::{Client, MailError, Message};
use tracing::error;

#[derive(Parser)]
#[command(name = "mailsubmit-send")]
#[command(about = "Submit a message to a mailsubmit server", long_about = None)]
#[command(version)]
struct Cli {
    /// Sender address
    #[arg(short, long)]
    from: String,

    /// Recipient address, repeat for more than one
    #[arg(short, long = "to", required = true)]
    to: Vec<String>,

    #[arg(short, long, default_value = "")]
    subject: String,

    #[arg(short, long, default_value = "")]
    body: String,

    /// File to attach, repeat for more than one
    #[arg(short, long)]
    attach: Vec<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let mut message = Message::build(cli.from, cli.subject, cli.body)?;
    for recipient in cli.to {
        message.add_recipient(recipient)?;
    }
    for path in &cli.attach {
        message.add_attachment_with_limit(path, config.max_attachment_size)?;
    }

    let client = Client::with_config(config)?;
    Ok(client.send_mail(message).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = setup_tracing("warn") {
        eprintln!("Couldn't set up logging: {}", e);
    }

    match run(Cli::parse()).await {
        Ok(true) => {
            println!("Message delivered");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("Server rejected the message, check the server log");
            ExitCode::from(1)
        }
        Err(e) => {
            if let Some(MailError::Connection { .. } | MailError::HostResolution { .. }) =
                e.downcast_ref::<MailError>()
            {
                error!("Server unreachable");
            }
            eprintln!("Sending failed: {}", e);
            ExitCode::from(2)
        }
    }
}
