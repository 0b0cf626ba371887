//! Serving side of the control channel: claim the channel exclusively, then
//! accept one connection at a time and hand each decoded message to a
//! callback.

use std::fs::File;
use std::time::Duration;

use fs2::FileExt as _;
use metronome_core::channel::{ChannelPaths, ClaimError};
use metronome_core::message::{ControlMessage, ServerEvent, MAX_MESSAGE_BYTES};
use tokio::io::AsyncReadExt as _;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// Cloneable stop handle for a running [`ChannelServer`]. Stop requests are
/// idempotent and safe from any task, including the dispatch callback.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl ServerHandle {
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

/// A claimed channel: the lock file is held exclusively and the socket is
/// bound. Dropping the server releases the claim.
pub struct ChannelServer {
    listener: UnixListener,
    lock: File,
    paths: ChannelPaths,
    handle: ServerHandle,
}

/// Claims the channel for this process.
///
/// The lock file decides ownership; the socket file is only touched by the
/// winner, so a stale socket left by a crashed instance gets replaced while
/// a live instance's socket is never disturbed by a losing claimant.
pub async fn claim(paths: &ChannelPaths) -> Result<ChannelServer, ClaimError> {
    tokio::fs::create_dir_all(&paths.base_dir)
        .await
        .map_err(|source| io_error(paths, source))?;

    let lock = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&paths.lock_path)
        .map_err(|source| io_error(paths, source))?;

    if let Err(err) = lock.try_lock_exclusive() {
        if err.kind() == fs2::lock_contended_error().kind() {
            return Err(ClaimError::AlreadyRunning {
                name: paths.name.clone(),
            });
        }
        return Err(io_error(paths, err));
    }

    // The lock is ours, so any socket already on disk is stale.
    if paths.socket_path.exists() {
        tokio::fs::remove_file(&paths.socket_path)
            .await
            .map_err(|source| io_error(paths, source))?;
    }

    let listener =
        UnixListener::bind(&paths.socket_path).map_err(|source| io_error(paths, source))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let _ = std::fs::set_permissions(
            &paths.socket_path,
            std::fs::Permissions::from_mode(0o600),
        );
    }

    let (shutdown_tx, _) = watch::channel(false);
    tracing::debug!(channel = %paths.name, lock = %paths.lock_path.display(), "channel claimed");

    Ok(ChannelServer {
        listener,
        lock,
        paths: paths.clone(),
        handle: ServerHandle { shutdown_tx },
    })
}

fn io_error(paths: &ChannelPaths, source: std::io::Error) -> ClaimError {
    ClaimError::Io {
        name: paths.name.clone(),
        source,
    }
}

impl ChannelServer {
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn paths(&self) -> &ChannelPaths {
        &self.paths
    }

    /// Serves the channel until a stop is requested.
    ///
    /// Connections are taken strictly one at a time; a sender that arrives
    /// while another is being read waits in the accept backlog. The callback
    /// runs inline, so event handlers never overlap.
    pub async fn run<F>(self, mut on_event: F)
    where
        F: FnMut(ServerEvent),
    {
        let mut shutdown_rx = self.handle.subscribe();
        tracing::info!(socket = %self.paths.socket_path.display(), "listener ready");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            self.serve_connection(stream, &mut on_event, &mut shutdown_rx).await;
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
            }
        }

        cleanup_socket(&self.paths).await;
        let _ = self.lock.unlock();
        tracing::info!(channel = %self.paths.name, "listener stopped");
    }

    /// Reads one connection to completion and dispatches the message it
    /// carried. The read is raced against shutdown so a stop request never
    /// waits behind a stalled sender.
    async fn serve_connection<F>(
        &self,
        mut stream: UnixStream,
        on_event: &mut F,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) where
        F: FnMut(ServerEvent),
    {
        let mut buf = [0u8; MAX_MESSAGE_BYTES];
        let mut filled = 0;

        loop {
            if filled == buf.len() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                read = stream.read(&mut buf[filled..]) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(err) => {
                            tracing::debug!(error = %err, "connection read failed");
                            return;
                        }
                    }
                }
            }
        }
        drop(stream);

        let raw = match std::str::from_utf8(&buf[..filled]) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "dropping non-utf8 message");
                return;
            }
        };

        let message = match ControlMessage::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                // Empty connections are probes; anything else is noise.
                tracing::debug!(error = %err, "dropping message");
                return;
            }
        };

        tracing::debug!(channel = %self.paths.name, msg = %message, "dispatching");
        if matches!(message, ControlMessage::Stop) {
            self.handle.request_shutdown();
        }
        on_event(ServerEvent::from_message(message));
    }
}

async fn cleanup_socket(paths: &ChannelPaths) {
    let _ = tokio::fs::remove_file(&paths.socket_path).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    use metronome_core::channel::resolve_paths;
    use metronome_core::message::MSG_COMMAND_PREFIX;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn claim_is_exclusive_per_channel() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = resolve_paths(dir.path(), "solo");

        let first = claim(&paths).await.unwrap();
        let second = claim(&paths).await;
        assert!(matches!(second, Err(ClaimError::AlreadyRunning { .. })));
        // The loser must not have disturbed the winner's socket.
        assert!(paths.socket_path.exists());

        drop(first);
        let third = claim(&paths).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn different_channels_do_not_contend() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = claim(&resolve_paths(dir.path(), "alpha")).await.unwrap();
        let b = claim(&resolve_paths(dir.path(), "beta")).await.unwrap();
        drop((a, b));
    }

    #[tokio::test]
    async fn stop_request_unblocks_the_listener() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = resolve_paths(dir.path(), "stopme");
        let server = claim(&paths).await.unwrap();
        let handle = server.handle();

        let task = tokio::spawn(server.run(|_event| {}));
        handle.request_shutdown();

        let joined = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap();
        joined.unwrap();
        assert!(!paths.socket_path.exists());
    }

    #[tokio::test]
    async fn messages_dispatch_in_arrival_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = resolve_paths(dir.path(), "events");
        let server = claim(&paths).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = tokio::spawn(server.run(move |event| {
            tx.send(event).ok();
        }));

        send_raw(&paths, b"-show").await;
        assert_eq!(recv(&mut rx).await, ServerEvent::Show);

        send_raw(&paths, b"-pause").await;
        assert_eq!(recv(&mut rx).await, ServerEvent::Pause);

        send_raw(&paths, b"-stop").await;
        assert_eq!(recv(&mut rx).await, ServerEvent::Stop);

        // A stop message also stops the listener itself.
        let joined = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap();
        joined.unwrap();
        assert!(!paths.socket_path.exists());
    }

    #[tokio::test]
    async fn bad_input_is_dropped_and_serving_continues() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = resolve_paths(dir.path(), "noise");
        let server = claim(&paths).await.unwrap();
        let handle = server.handle();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = tokio::spawn(server.run(move |event| {
            tx.send(event).ok();
        }));

        send_raw(&paths, b"").await;
        send_raw(&paths, &[0xff, 0xfe, 0x2d]).await;
        send_raw(&paths, b"-commandeer x").await;
        send_raw(&paths, b"-show").await;

        assert_eq!(recv(&mut rx).await, ServerEvent::Show);

        handle.request_shutdown();
        let joined = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap();
        joined.unwrap();
    }

    #[tokio::test]
    async fn only_the_first_256_bytes_are_observed() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = resolve_paths(dir.path(), "long");
        let server = claim(&paths).await.unwrap();
        let handle = server.handle();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let task = tokio::spawn(server.run(move |event| {
            tx.send(event).ok();
        }));

        let oversized = format!("{MSG_COMMAND_PREFIX} {}", "a".repeat(300));
        send_raw(&paths, oversized.as_bytes()).await;

        match recv(&mut rx).await {
            ServerEvent::Command { text, .. } => {
                assert_eq!(text.len(), MAX_MESSAGE_BYTES - MSG_COMMAND_PREFIX.len() - 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.request_shutdown();
        let joined = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap();
        joined.unwrap();
    }

    async fn send_raw(paths: &ChannelPaths, bytes: &[u8]) {
        let mut stream = UnixStream::connect(&paths.socket_path).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    async fn recv(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServerEvent>,
    ) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }
}
