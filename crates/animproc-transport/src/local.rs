//! Unix datagram endpoints
//!
//! A client announces itself to a server with a zero-length datagram. The
//! server adopts the first announcing peer as its client and ignores any other
//! peer until that client is disconnected. Zero-length datagrams are control
//! traffic and never surface from `try_recv`.

use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use animproc_core::{AnimError, AnimResult};

use crate::PeerLink;

/// Remove a leftover socket file at `path` unless something is bound to it
fn clear_stale_socket(path: &Path) -> AnimResult<()> {
    if !path.exists() {
        return Ok(());
    }
    let probe = UnixDatagram::unbound().map_err(|e| AnimError::Transport(e.to_string()))?;
    if probe.connect(path).is_ok() {
        return Err(AnimError::Transport(format!(
            "{} is already bound",
            path.display()
        )));
    }
    std::fs::remove_file(path).map_err(|e| AnimError::Transport(e.to_string()))
}

fn bind_nonblocking(path: &Path) -> AnimResult<UnixDatagram> {
    let socket = UnixDatagram::bind(path).map_err(|e| AnimError::Transport(e.to_string()))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| AnimError::Transport(e.to_string()))?;
    Ok(socket)
}

/// Listening endpoint serving at most one client
pub struct LocalServer {
    socket: UnixDatagram,
    path: PathBuf,
    client: Option<PathBuf>,
}

impl LocalServer {
    /// Bind a server endpoint at `path`
    pub fn listen(path: impl AsRef<Path>) -> AnimResult<Self> {
        let path = path.as_ref().to_path_buf();
        clear_stale_socket(&path)?;
        let socket = bind_nonblocking(&path)?;
        tracing::info!(path = %path.display(), "listening");
        Ok(LocalServer {
            socket,
            path,
            client: None,
        })
    }

    /// Path this server is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a client is attached
    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// Path of the attached client, if any
    pub fn client_path(&self) -> Option<&Path> {
        self.client.as_deref()
    }
}

impl PeerLink for LocalServer {
    fn is_connected(&self) -> bool {
        self.has_client()
    }

    fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            tracing::info!(server = %self.path.display(), client = %client.display(), "client disconnected");
        }
    }

    fn try_send(&mut self, bytes: &[u8]) -> bool {
        let Some(client) = self.client.as_ref() else {
            return false;
        };
        match self.socket.send_to(bytes, client) {
            Ok(sent) if sent == bytes.len() => true,
            Ok(sent) => {
                tracing::warn!(sent, expected = bytes.len(), "partial send to client");
                self.disconnect();
                false
            }
            Err(e) => {
                tracing::warn!("send to client failed: {}", e);
                self.disconnect();
                false
            }
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> usize {
        loop {
            let (len, addr) = match self.socket.recv_from(buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return 0,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("receive failed: {}", e);
                    self.disconnect();
                    return 0;
                }
            };

            let Some(peer) = addr.as_pathname() else {
                tracing::debug!("ignoring datagram from unnamed peer");
                continue;
            };

            match &self.client {
                Some(client) if client.as_path() == peer => {
                    if len > 0 {
                        return len;
                    }
                }
                Some(client) => {
                    tracing::warn!(
                        client = %client.display(),
                        refused = %peer.display(),
                        "refusing second client"
                    );
                }
                None => {
                    tracing::info!(server = %self.path.display(), client = %peer.display(), "client connected");
                    self.client = Some(peer.to_path_buf());
                    if len > 0 {
                        return len;
                    }
                }
            }
        }
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Endpoint attached to a fixed remote server
pub struct LocalClient {
    socket: Option<UnixDatagram>,
    local_path: PathBuf,
    remote_path: PathBuf,
}

impl LocalClient {
    /// Bind `local_path` and attach to the server at `remote_path`
    pub fn connect(local_path: impl AsRef<Path>, remote_path: impl AsRef<Path>) -> AnimResult<Self> {
        let mut client = LocalClient {
            socket: None,
            local_path: local_path.as_ref().to_path_buf(),
            remote_path: remote_path.as_ref().to_path_buf(),
        };
        client.open()?;
        Ok(client)
    }

    fn open(&mut self) -> AnimResult<()> {
        // The local path is ours; a leftover file means an earlier run died
        if self.local_path.exists() {
            std::fs::remove_file(&self.local_path)
                .map_err(|e| AnimError::Transport(e.to_string()))?;
        }
        let socket = bind_nonblocking(&self.local_path)?;
        let attached = socket
            .connect(&self.remote_path)
            .and_then(|_| socket.send(&[]));
        if let Err(e) = attached {
            let _ = std::fs::remove_file(&self.local_path);
            return Err(AnimError::Transport(format!(
                "connect to {} failed: {}",
                self.remote_path.display(),
                e
            )));
        }
        tracing::info!(
            local = %self.local_path.display(),
            remote = %self.remote_path.display(),
            "connected"
        );
        self.socket = Some(socket);
        Ok(())
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_path(&self) -> &Path {
        &self.remote_path
    }
}

impl PeerLink for LocalClient {
    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            let _ = std::fs::remove_file(&self.local_path);
            tracing::info!(remote = %self.remote_path.display(), "disconnected");
        }
    }

    fn try_send(&mut self, bytes: &[u8]) -> bool {
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };
        match socket.send(bytes) {
            Ok(sent) if sent == bytes.len() => true,
            Ok(sent) => {
                tracing::warn!(sent, expected = bytes.len(), "partial send to server");
                self.disconnect();
                false
            }
            Err(e) => {
                tracing::warn!("send to server failed: {}", e);
                self.disconnect();
                false
            }
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return 0;
        };
        loop {
            match socket.recv(buf) {
                Ok(len) => return len,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return 0,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("receive failed: {}", e);
                    self.disconnect();
                    return 0;
                }
            }
        }
    }

    fn reconnect(&mut self) -> AnimResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        self.open()
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        if self.socket.is_some() {
            let _ = std::fs::remove_file(&self.local_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("animproc_{}_{}_{}", std::process::id(), name, n))
    }

    fn recv_eventually(link: &mut dyn PeerLink, buf: &mut [u8]) -> usize {
        for _ in 0..100 {
            let n = link.try_recv(buf);
            if n > 0 {
                return n;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        0
    }

    #[test]
    fn test_client_server_exchange() {
        let server_path = temp_path("server");
        let mut server = LocalServer::listen(&server_path).unwrap();
        assert!(!server.has_client());

        let mut client = LocalClient::connect(temp_path("client"), &server_path).unwrap();
        assert!(client.is_connected());

        let mut buf = [0u8; 64];
        // Handshake is consumed, not delivered
        assert_eq!(server.try_recv(&mut buf), 0);
        assert!(server.has_client());

        assert!(client.try_send(b"ping"));
        let n = recv_eventually(&mut server, &mut buf);
        assert_eq!(&buf[..n], b"ping");

        assert!(server.try_send(b"pong"));
        let n = recv_eventually(&mut client, &mut buf);
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn test_second_client_refused() {
        let server_path = temp_path("server");
        let mut server = LocalServer::listen(&server_path).unwrap();
        let first_path = temp_path("first");
        let mut first = LocalClient::connect(&first_path, &server_path).unwrap();
        let mut buf = [0u8; 64];
        server.try_recv(&mut buf);
        assert_eq!(server.client_path(), Some(first_path.as_path()));

        let mut second = LocalClient::connect(temp_path("second"), &server_path).unwrap();
        assert!(second.try_send(b"intruder"));
        assert!(first.try_send(b"owner"));
        let n = recv_eventually(&mut server, &mut buf);
        assert_eq!(&buf[..n], b"owner");
        assert_eq!(server.client_path(), Some(first_path.as_path()));

        // Once the first client is dropped the next announcer is adopted
        server.disconnect();
        second.disconnect();
        second.reconnect().unwrap();
        assert_eq!(server.try_recv(&mut buf), 0);
        assert!(server.has_client());
        assert_ne!(server.client_path(), Some(first_path.as_path()));
    }

    #[test]
    fn test_listen_on_bound_path_fails() {
        let server_path = temp_path("server");
        let _server = LocalServer::listen(&server_path).unwrap();
        assert!(LocalServer::listen(&server_path).is_err());
    }

    #[test]
    fn test_connect_to_missing_server_fails() {
        let local = temp_path("client");
        assert!(LocalClient::connect(&local, temp_path("nobody")).is_err());
        assert!(!local.exists());
    }

    #[test]
    fn test_send_to_vanished_client_disconnects() {
        let server_path = temp_path("server");
        let mut server = LocalServer::listen(&server_path).unwrap();
        let client = LocalClient::connect(temp_path("client"), &server_path).unwrap();
        let mut buf = [0u8; 16];
        server.try_recv(&mut buf);
        assert!(server.has_client());

        drop(client);
        assert!(!server.try_send(b"hello?"));
        assert!(!server.has_client());
        assert!(!server.try_send(b"again"));
    }
}
