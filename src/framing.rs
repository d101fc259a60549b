//! Lossless line framing over arbitrarily chunked output
//!
//! Transports deliver raw byte chunks whose boundaries carry no semantic
//! meaning: one line may be split across chunks, or several lines may arrive in
//! a single chunk. The framer buffers partial trailing fragments across chunk
//! boundaries and yields complete lines as they become available.

/// Splits a chunked byte stream into complete lines.
///
/// The delimiter is configurable; a `\r` immediately preceding the delimiter is
/// stripped so CRLF output frames the same as LF output. The framer never
/// fails; invalid UTF-8 is replaced lossily.
#[derive(Debug)]
pub struct LineFramer {
    delimiter: u8,
    buf: Vec<u8>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_delimiter(b'\n')
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter,
            buf: Vec::new(),
        }
    }

    /// Feed one chunk and collect every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == self.delimiter) {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush a trailing fragment left over when the transport closes.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }
}
