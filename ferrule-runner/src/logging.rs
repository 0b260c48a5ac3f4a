//! Process-level logging
//!
//! Runner output goes to stdout through `tracing`. When `RUNNER_LOG_SOCKET`
//! names a Unix socket, every line is mirrored to it as well. A socket that
//! cannot be reached leaves stdout as the only output.

use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the log mirror socket
pub const LOG_SOCKET_VAR: &str = "RUNNER_LOG_SOCKET";

const DEFAULT_FILTER: &str = "ferrule_runner=info,ferrule_core=info";

#[cfg(unix)]
pub type SocketWriter = Mutex<std::os::unix::net::UnixStream>;
#[cfg(not(unix))]
pub type SocketWriter = Mutex<std::io::Sink>;

/// Connect to the mirror socket at `path`
#[cfg(unix)]
pub fn connect_socket(path: &Path) -> std::io::Result<SocketWriter> {
    std::os::unix::net::UnixStream::connect(path).map(Mutex::new)
}

#[cfg(not(unix))]
pub fn connect_socket(_path: &Path) -> std::io::Result<SocketWriter> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "log sockets need Unix domain sockets",
    ))
}

/// Install the global subscriber
pub fn init() {
    let socket_path = std::env::var(LOG_SOCKET_VAR).ok().filter(|p| !p.is_empty());
    let (socket, socket_error) = match socket_path.as_deref().map(|p| connect_socket(Path::new(p))) {
        Some(Ok(writer)) => (Some(writer), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(fmt::layer())
        .with(socket.map(|writer| fmt::layer().with_ansi(false).with_writer(writer)))
        .init();

    if let (Some(path), Some(e)) = (socket_path, socket_error) {
        warn!("Log socket {} unavailable, logging to stdout only: {}", path, e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::net::UnixListener;
    use tracing_subscriber::Registry;

    #[test]
    fn test_lines_are_mirrored_to_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let writer = connect_socket(&path).unwrap();
        let subscriber =
            Registry::default().with(fmt::layer().with_ansi(false).with_writer(writer));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("mirrored line");
        });

        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let mut bytes = Vec::new();
        let mut chunk = [0u8; 1024];
        while let Ok(n @ 1..) = stream.read(&mut chunk) {
            bytes.extend_from_slice(&chunk[..n]);
        }
        let received = String::from_utf8_lossy(&bytes);
        assert!(received.contains("INFO"));
        assert!(received.contains("mirrored line"));
    }

    #[test]
    fn test_missing_socket_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(connect_socket(&dir.path().join("absent.sock")).is_err());
    }
}
