//! Socket relay transport for opaque execution contexts
//!
//! Used when the command runs somewhere the raw stdout stream cannot be
//! exposed, such as a terminal-hosted task. A uniquely named local endpoint is
//! bound before the process starts; the forwarding helper connects to it as a
//! client and writes every byte it also echoes to the terminal. The first
//! accepted connection is the authoritative data source; the protocol assumes
//! exactly one producer per operation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{chunk_stream, relay_endpoint, ChunkStream, OutputTransport};

#[cfg(unix)]
pub struct SocketRelay {
    path: PathBuf,
    listener: Option<tokio::net::UnixListener>,
}

#[cfg(unix)]
impl SocketRelay {
    /// Bind the endpoint. Must happen before the operation is spawned so the
    /// helper has something to connect to.
    pub fn bind() -> std::io::Result<Self> {
        let path = relay_endpoint();
        let listener = tokio::net::UnixListener::bind(&path)?;
        tracing::debug!(path = %path.display(), "relay endpoint bound");
        Ok(Self {
            path,
            listener: Some(listener),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
#[async_trait]
impl OutputTransport for SocketRelay {
    async fn open(&mut self) -> std::io::Result<ChunkStream> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| std::io::Error::other("relay endpoint already consumed"))?;
        let (stream, _addr) = listener.accept().await?;
        tracing::debug!(path = %self.path.display(), "relay producer connected");
        Ok(chunk_stream(stream))
    }

    async fn close(&mut self) {
        self.listener = None;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove relay socket");
            }
        }
    }
}

#[cfg(windows)]
pub struct SocketRelay {
    path: PathBuf,
    pipe: Option<tokio::net::windows::named_pipe::NamedPipeServer>,
}

#[cfg(windows)]
impl SocketRelay {
    pub fn bind() -> std::io::Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let path = relay_endpoint();
        let pipe = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&path)?;
        tracing::debug!(path = %path.display(), "relay endpoint bound");
        Ok(Self {
            path,
            pipe: Some(pipe),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(windows)]
#[async_trait]
impl OutputTransport for SocketRelay {
    async fn open(&mut self) -> std::io::Result<ChunkStream> {
        let pipe = self
            .pipe
            .take()
            .ok_or_else(|| std::io::Error::other("relay endpoint already consumed"))?;
        pipe.connect().await?;
        tracing::debug!(path = %self.path.display(), "relay producer connected");
        Ok(chunk_stream(pipe))
    }

    async fn close(&mut self) {
        self.pipe = None;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn first_connection_is_the_data_source() {
        let mut relay = SocketRelay::bind().unwrap();
        let path = relay.path().to_path_buf();

        let producer = tokio::spawn(async move {
            let mut stream = tokio::net::UnixStream::connect(&path).await.unwrap();
            stream.write_all(b"10% 1/10\n").await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let mut chunks = relay.open().await.unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = chunks.next().await {
            bytes.extend(chunk.unwrap());
        }
        assert_eq!(bytes, b"10% 1/10\n");

        producer.await.unwrap();
        relay.close().await;
        assert!(!relay.path().exists());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut relay = SocketRelay::bind().unwrap();
        relay.close().await;
        relay.close().await;
    }

    #[tokio::test]
    async fn concurrent_relays_do_not_collide() {
        let a = SocketRelay::bind().unwrap();
        let b = SocketRelay::bind().unwrap();
        assert_ne!(a.path(), b.path());
    }
}
