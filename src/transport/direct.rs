//! Direct pipe transport reading the child's stdout

use async_trait::async_trait;
use tokio::process::ChildStdout;

use super::{chunk_stream, ChunkStream, OutputTransport};

/// Reads the child process's own standard-output stream directly.
///
/// Only viable when the caller's execution context can expose that stream;
/// the socket relay covers the cases where it cannot.
pub struct DirectPipe {
    stdout: Option<ChildStdout>,
}

impl DirectPipe {
    pub fn new(stdout: Option<ChildStdout>) -> Self {
        Self { stdout }
    }
}

#[async_trait]
impl OutputTransport for DirectPipe {
    async fn open(&mut self) -> std::io::Result<ChunkStream> {
        let stdout = self
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("child stdout was not captured"))?;
        Ok(chunk_stream(stdout))
    }

    async fn close(&mut self) {
        self.stdout = None;
    }
}
