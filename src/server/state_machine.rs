use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::MailError;
use crate::models::Message;
use crate::server::sink::MailSink;
use crate::wire::{read_message, write_response};

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_size: usize,
}

/// One connection's life: exactly one message in, exactly one byte out.
#[derive(Debug, PartialEq)]
pub enum State {
    Receiving,
    Delivering(Message),
    Replying { delivered: bool },
    Closed,
}

#[derive(Debug)]
pub enum Event {
    Received(Message),
    /// Decoding failed but the peer may still be listening.
    Unreadable(MailError),
    /// Nothing useful can be written back.
    Lost(MailError),
    Delivered,
    Refused(String),
    Replied,
}

impl State {
    pub fn next(self, event: Event) -> State {
        match (self, event) {
            (State::Receiving, Event::Received(message)) => State::Delivering(message),
            (State::Receiving, Event::Unreadable(_)) => State::Replying { delivered: false },
            (State::Delivering(_), Event::Delivered) => State::Replying { delivered: true },
            (State::Delivering(_), Event::Refused(_)) => State::Replying { delivered: false },
            (State::Replying { .. }, Event::Replied) => State::Closed,
            (_, Event::Lost(_)) => State::Closed,
            (_, _) => State::Closed,
        }
    }

    /// Does the I/O for the current state and reports what happened.
    pub async fn run<S, M>(&self, stream: &mut S, sink: &M, limits: &SessionLimits) -> Event
    where
        S: AsyncRead + AsyncWrite + Unpin,
        M: MailSink + ?Sized,
    {
        match self {
            State::Receiving => {
                let read = timeout(
                    limits.read_timeout,
                    read_message(&mut *stream, limits.max_message_size),
                )
                .await;

                match read {
                    Ok(Ok(message)) => {
                        debug!("Received {}", message);
                        Event::Received(message)
                    }
                    Ok(Err(e @ MailError::Transport { .. })) => Event::Lost(e),
                    Ok(Err(e)) => Event::Unreadable(e),
                    Err(_) => Event::Lost(MailError::transport(
                        "reading message",
                        format!("timed out after {}ms", limits.read_timeout.as_millis()),
                    )),
                }
            }
            State::Delivering(message) => {
                if let Err(e) = message.ensure_sendable() {
                    return Event::Refused(e.to_string());
                }
                match sink.deliver(message).await {
                    Ok(()) => Event::Delivered,
                    Err(e) => Event::Refused(e.to_string()),
                }
            }
            State::Replying { delivered } => {
                debug!("Replying {}", if *delivered { "1" } else { "0" });
                match timeout(limits.write_timeout, write_response(&mut *stream, *delivered)).await {
                    Ok(Ok(())) => Event::Replied,
                    Ok(Err(e)) => Event::Lost(e),
                    Err(_) => Event::Lost(MailError::transport(
                        "writing response",
                        format!("timed out after {}ms", limits.write_timeout.as_millis()),
                    )),
                }
            }
            State::Closed => Event::Replied,
        }
    }
}

/// Drives one connection from `Receiving` to `Closed`. Returns whether the
/// message was delivered.
pub async fn run_session<S, M>(stream: &mut S, sink: &M, limits: &SessionLimits) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: MailSink + ?Sized,
{
    let mut state = State::Receiving;
    let mut delivered = false;

    while state != State::Closed {
        let event = state.run(&mut *stream, sink, limits).await;
        match &event {
            Event::Unreadable(e) => warn!("Couldn't decode message: {}", e),
            Event::Lost(e) => warn!("Connection lost: {}", e),
            Event::Refused(reason) => warn!("Delivery refused: {}", reason),
            Event::Delivered => delivered = true,
            Event::Received(_) | Event::Replied => {}
        }
        state = state.next(event);
    }

    delivered
}
