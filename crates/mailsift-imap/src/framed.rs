//! Framed I/O for the IMAP protocol.
//!
//! IMAP responses are CRLF-terminated lines, optionally followed by byte
//! literals announced as `{n}` at the end of a line. This module provides a
//! buffered reader/writer that reassembles complete responses and collects
//! everything up to a tagged completion line.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Result;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024; // 64 MB

/// Buffered framed connection speaking the IMAP line protocol.
pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Framed<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream in a framed reader/writer.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(8192),
        }
    }

    /// Reads one complete response: a line plus any literals it announces.
    ///
    /// The returned bytes include the terminating CRLF of every line and the
    /// raw literal data in the positions the server sent them.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.next_line().await?;
            response.extend_from_slice(&line);

            let Some(len) = literal_length(&line) else {
                return Ok(response);
            };
            if len > MAX_LITERAL_SIZE {
                return Err(crate::Error::Protocol(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            self.read_exact_into(&mut response, len).await?;
        }
    }

    /// Reads responses until a line tagged with `tag` arrives.
    ///
    /// Returns all collected responses; the tagged completion is last.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response().await?;
            let done = is_tagged(&response, tag);
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
    }

    /// Writes a complete command line (caller supplies the CRLF).
    pub async fn write_line(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads one CRLF-terminated line, including the CRLF.
    async fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                return Ok(self.buf.split_to(pos + 2).to_vec());
            }
            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(crate::Error::Protocol("line too long".to_string()));
            }
            self.fill().await?;
        }
    }

    /// Appends exactly `len` bytes of literal data to `out`.
    async fn read_exact_into(&mut self, out: &mut Vec<u8>, len: usize) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = remaining.min(self.buf.len());
            out.extend_from_slice(&self.buf[..take]);
            self.buf.advance(take);
            remaining -= take;
        }
        Ok(())
    }

    /// Reads more bytes from the stream into the buffer.
    async fn fill(&mut self) -> Result<()> {
        let n = self.stream.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Err(crate::Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        Ok(())
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Checks whether a response is the tagged completion for `tag`.
fn is_tagged(response: &[u8], tag: &str) -> bool {
    response
        .get(..tag.len())
        .is_some_and(|prefix| prefix == tag.as_bytes())
        && response.get(tag.len()).is_some_and(|&b| b == b' ')
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing form `{123+}\r\n`.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    if line.last() != Some(&b'}') {
        return None;
    }
    let open = line.iter().rposition(|&b| b == b'{')?;

    let inner = &line[open + 1..line.len() - 1];
    let digits = inner.strip_suffix(b"+").unwrap_or(inner);
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn finds_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
    }

    #[test]
    fn parses_literal_length() {
        assert_eq!(literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(literal_length(b"no literal\r\n"), None);
        assert_eq!(literal_length(b"incomplete {123"), None);
        assert_eq!(literal_length(b"wrong {abc}\r\n"), None);
    }

    #[test]
    fn detects_tagged_line() {
        assert!(is_tagged(b"A0001 OK done\r\n", "A0001"));
        assert!(!is_tagged(b"A00012 OK done\r\n", "A0001"));
        assert!(!is_tagged(b"* OK ready\r\n", "A0001"));
    }

    #[tokio::test]
    async fn reads_simple_line() {
        let mock = tokio_test::io::Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = Framed::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn reads_response_with_literal() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (RFC822 {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = Framed::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (RFC822 {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn collects_until_tagged() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* SEARCH 4 9\r\n")
            .read(b"A0000 OK SEARCH completed\r\n")
            .build();
        let mut framed = Framed::new(mock);

        let responses = framed.read_until_tagged("A0000").await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], b"* SEARCH 4 9\r\n");
        assert_eq!(responses[1], b"A0000 OK SEARCH completed\r\n");
    }

    #[tokio::test]
    async fn rejects_oversized_literal() {
        let header = format!("* 1 FETCH (RFC822 {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = tokio_test::io::Builder::new().read(header.as_bytes()).build();
        let mut framed = Framed::new(mock);

        let result = framed.read_response().await;
        assert!(result.is_err());
    }
}
