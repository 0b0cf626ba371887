//! Client side of the control channel: connect to the socket of a running
//! instance and hand it one message.

use std::io;
use std::time::Duration;

use metronome_core::channel::ChannelPaths;
use metronome_core::message::{ControlMessage, MAX_MESSAGE_BYTES};
use tokio::io::AsyncWriteExt as _;
use tokio::net::UnixStream;

/// How long a sender waits for the listener before concluding nobody is
/// there. Overridable through `METRONOME_CONNECT_TIMEOUT_MS`.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// What became of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was written and the connection closed.
    Sent,
    /// No instance is listening on the channel. Covers the missing socket,
    /// a stale socket nobody accepts on, and the connect timeout.
    NoListener,
}

/// Sends a single message over its own short-lived connection.
///
/// The encoded form is capped at [`MAX_MESSAGE_BYTES`]; anything longer is
/// cut at the cap, which mirrors what the listener would keep anyway.
pub async fn send(
    paths: &ChannelPaths,
    message: &ControlMessage,
    timeout: Duration,
) -> io::Result<SendOutcome> {
    let mut stream = match connect(paths, timeout).await? {
        Some(stream) => stream,
        None => return Ok(SendOutcome::NoListener),
    };

    let encoded = message.encode();
    let bytes = encoded.as_bytes();
    let capped = &bytes[..bytes.len().min(MAX_MESSAGE_BYTES)];

    stream.write_all(capped).await?;
    stream.flush().await?;
    // Half-close so the listener's read-to-end returns without waiting on us.
    stream.shutdown().await.ok();

    tracing::debug!(channel = %paths.name, msg = %message, "message sent");
    Ok(SendOutcome::Sent)
}

/// Checks whether anything is accepting on the channel without sending a
/// message. The listener sees an empty connection and ignores it.
pub async fn probe(paths: &ChannelPaths, timeout: Duration) -> bool {
    matches!(connect(paths, timeout).await, Ok(Some(_)))
}

async fn connect(paths: &ChannelPaths, timeout: Duration) -> io::Result<Option<UnixStream>> {
    match tokio::time::timeout(timeout, UnixStream::connect(&paths.socket_path)).await {
        Err(_elapsed) => Ok(None),
        Ok(Ok(stream)) => Ok(Some(stream)),
        Ok(Err(err))
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            Ok(None)
        }
        Ok(Err(err)) => Err(err),
    }
}
