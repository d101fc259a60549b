//! Forwarding helper process body
//!
//! Runs as a separate process between the operation and the relay endpoint:
//! reads its own stdin and writes every byte unchanged both to stdout (so the
//! terminal still shows the tool's output) and to the connected endpoint.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Duplicate stdin to stdout and the relay endpoint until EOF.
pub async fn run(endpoint: &Path) -> Result<()> {
    let mut sink = connect(endpoint)
        .await
        .with_context(|| format!("connecting to relay endpoint {}", endpoint.display()))?;
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let mut buf = [0u8; 8192];
    loop {
        let n = stdin.read(&mut buf).await.context("reading stdin")?;
        if n == 0 {
            break;
        }
        stdout
            .write_all(&buf[..n])
            .await
            .context("writing to stdout")?;
        stdout.flush().await.context("flushing stdout")?;
        sink.write_all(&buf[..n])
            .await
            .context("writing to relay endpoint")?;
    }

    sink.shutdown().await.context("closing relay endpoint")?;
    Ok(())
}

#[cfg(unix)]
async fn connect(endpoint: &Path) -> std::io::Result<tokio::net::UnixStream> {
    tokio::net::UnixStream::connect(endpoint).await
}

#[cfg(windows)]
async fn connect(
    endpoint: &Path,
) -> std::io::Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(endpoint)
}
