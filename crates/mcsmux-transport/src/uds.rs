use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Default maximum inbound chunk size: 1 MiB.
///
/// Domain negotiation bounds PDU sizes far below this; the cap only guards
/// against garbage length prefixes on the wire.
pub const DEFAULT_MAX_CHUNK: usize = 1024 * 1024;

const LEN_PREFIX_SIZE: usize = 4;

/// Unix domain socket listener for MCS connections.
///
/// The socket file is created at bind time with mode 0600 and removed
/// again when the listener is dropped.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixDomainSocket {
    /// Maximum socket path length (`sockaddr_un.sun_path`).
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// An existing file at `path` is removed first if it is a socket
    /// (stale socket cleanup); any other file type is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).map_err(|e| {
            TransportError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;

        info!(?path, "listening on unix domain socket");
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<SocketTransport> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!("accepted connection");
        Ok(SocketTransport::new(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket() {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

/// Record-oriented transport over a Unix stream socket.
///
/// Every chunk crosses the wire as a 4-byte little-endian length prefix
/// followed by the chunk bytes, so the receiving side recovers exactly
/// the chunk boundaries the sender produced. This plays the role the
/// packet framing below the session layer plays in the original protocol
/// stack: the state machines above always see one whole PDU per chunk.
pub struct SocketTransport {
    stream: UnixStream,
    max_chunk: usize,
    closed: bool,
}

impl SocketTransport {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            max_chunk: DEFAULT_MAX_CHUNK,
            closed: false,
        }
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to unix domain socket");
        Ok(Self::new(stream))
    }

    /// Override the maximum accepted inbound chunk size.
    pub fn set_max_chunk(&mut self, max_chunk: usize) {
        self.max_chunk = max_chunk;
    }

    /// Clone the transport (new file descriptor onto the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        let stream = self.stream.try_clone()?;
        Ok(Self {
            stream,
            max_chunk: self.max_chunk,
            closed: self.closed,
        })
    }

    /// Read the next whole chunk (blocking).
    ///
    /// Returns `Ok(None)` on clean EOF at a chunk boundary. EOF in the
    /// middle of a chunk is reported as [`TransportError::Closed`].
    pub fn recv_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut len_buf = [0u8; LEN_PREFIX_SIZE];
        match read_full(&mut self.stream, &mut len_buf)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Complete => {}
            ReadOutcome::Truncated => return Err(TransportError::Closed),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > self.max_chunk {
            return Err(TransportError::ChunkTooLarge {
                size: len,
                max: self.max_chunk,
            });
        }

        let mut payload = vec![0u8; len];
        match read_full(&mut self.stream, &mut payload)? {
            ReadOutcome::Complete => Ok(Some(Bytes::from(payload))),
            ReadOutcome::Eof | ReadOutcome::Truncated => Err(TransportError::Closed),
        }
    }
}

impl Transport for SocketTransport {
    fn send(&mut self, chunk: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if chunk.len() > u32::MAX as usize {
            return Err(TransportError::ChunkTooLarge {
                size: chunk.len(),
                max: u32::MAX as usize,
            });
        }

        let len = (chunk.len() as u32).to_le_bytes();
        write_full(&mut self.stream, &len)?;
        write_full(&mut self.stream, chunk)?;
        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.stream.shutdown(Shutdown::Both)?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

enum ReadOutcome {
    Complete,
    Eof,
    Truncated,
}

fn read_full(stream: &mut UnixStream, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadOutcome::Eof),
            Ok(0) => return Ok(ReadOutcome::Truncated),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok(ReadOutcome::Complete)
}

fn write_full(stream: &mut UnixStream, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => buf = &buf[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok(())
}
