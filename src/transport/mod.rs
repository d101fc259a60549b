//! Output transports delivering an operation's textual output to the parser
//!
//! Both variants produce the same thing: a stream of raw output chunks whose
//! boundaries carry no meaning. The direct pipe reads the child's stdout;
//! the socket relay accepts a single producer connection from the forwarding
//! helper when the raw stream is not exposed by the execution context.

pub mod direct;
pub mod relay;

pub use direct::DirectPipe;
pub use relay::SocketRelay;

use async_trait::async_trait;
use futures::stream::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

pub type ChunkStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Which transport variant an operation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Read the child's own stdout directly.
    Direct,
    /// Relay output through a local socket endpoint via the tee helper.
    Relay,
}

/// Capability to produce the operation's output as a chunk stream.
///
/// `open` may be awaited at most once and yields the authoritative data source
/// for the operation. `close` releases the underlying resource and is safe to
/// call more than once.
#[async_trait]
pub trait OutputTransport: Send {
    async fn open(&mut self) -> std::io::Result<ChunkStream>;
    async fn close(&mut self);
}

/// Uniquely named local endpoint for one operation.
///
/// The random token keeps concurrent operations from colliding in the shared
/// socket namespace.
#[cfg(unix)]
pub fn relay_endpoint() -> PathBuf {
    std::env::temp_dir().join(format!("buildpulse-{}.sock", Uuid::new_v4()))
}

/// Named-pipe style endpoint on Windows.
#[cfg(windows)]
pub fn relay_endpoint() -> PathBuf {
    PathBuf::from(format!(r"\\.\pipe\buildpulse-{}", Uuid::new_v4()))
}

pub(crate) fn chunk_stream<R>(source: R) -> ChunkStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(futures::stream::unfold(source, |mut source| async move {
        let mut buf = vec![0u8; 4096];
        match source.read(&mut buf).await {
            Ok(0) => None, // EOF
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), source))
            }
            Err(e) => Some((Err(e), source)),
        }
    }))
}
