//! Line-delimited byte-stream transport.
//!
//! This module implements the stdio framing used by MCP:
//!
//! - Each frame is one UTF-8 JSON message
//! - Frames are delimited by newlines
//! - Frames must not contain embedded newlines
//! - Blank lines are skipped
//!
//! A [`Transport`] wraps any buffered reader and writer: process stdio for a
//! server, child pipes for a client, or an in-process duplex pair. It splits
//! into a [`FrameReader`] and a [`FrameWriter`] so a dispatch loop can read
//! while callers write.
//!
//! Both halves release their stream handle on `close()`, which is idempotent.

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::mcp::error::TransportError;

/// Default frame limit (4 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Buffer size of in-process duplex pipes.
const DUPLEX_BUFFER_BYTES: usize = 64 * 1024;

type BoxReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Reading half of a transport.
pub struct FrameReader {
    /// Underlying stream, `None` once closed.
    reader: Option<BoxReader>,
    /// Largest accepted frame.
    max_frame_bytes: usize,
}

impl FrameReader {
    /// Reads the next non-blank frame, without its line terminator.
    ///
    /// Returns `None` at end of stream or after [`FrameReader::close`].
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or a frame exceeds the limit.
    pub async fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let max = self.max_frame_bytes;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        // Room for the frame plus "\r\n".
        let limit = max.saturating_add(2) as u64;

        loop {
            let mut frame = Vec::new();
            let bytes_read = (&mut *reader)
                .take(limit)
                .read_until(b'\n', &mut frame)
                .await?;

            if bytes_read == 0 {
                self.reader = None;
                return Ok(None);
            }

            if frame.last() == Some(&b'\n') {
                frame.pop();
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
            } else if bytes_read as u64 >= limit {
                return Err(TransportError::FrameTooLarge { limit: max });
            }

            if frame.len() > max {
                return Err(TransportError::FrameTooLarge { limit: max });
            }

            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Ok(Some(frame));
        }
    }

    /// Releases the stream. Later reads report end of stream.
    pub fn close(&mut self) {
        self.reader = None;
    }

    /// Returns `true` once closed or drained.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("closed", &self.is_closed())
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

/// Writing half of a transport.
pub struct FrameWriter {
    /// Underlying stream, `None` once closed.
    writer: Option<BoxWriter>,
}

impl FrameWriter {
    /// Writes one frame followed by a newline and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after close, or an I/O error.
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;

        debug_assert!(
            !frame.contains(&b'\n'),
            "frame must not contain embedded newlines"
        );

        writer.write_all(frame).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        Ok(())
    }

    /// Shuts down and releases the stream. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the final shutdown fails; the handle is released
    /// regardless.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.shutdown().await?;
        Ok(())
    }

    /// Returns `true` once closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A bidirectional frame transport.
#[derive(Debug)]
pub struct Transport {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Transport {
    /// Creates a transport over an arbitrary reader and writer.
    #[must_use]
    pub fn new<R, W>(reader: R, writer: W, max_frame_bytes: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: FrameReader {
                reader: Some(Box::new(BufReader::new(reader))),
                max_frame_bytes,
            },
            writer: FrameWriter {
                writer: Some(Box::new(writer)),
            },
        }
    }

    /// Creates a transport over this process's stdin and stdout.
    #[must_use]
    pub fn stdio(max_frame_bytes: usize) -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), max_frame_bytes)
    }

    /// Creates two connected in-process transports.
    #[must_use]
    pub fn pair(max_frame_bytes: usize) -> (Self, Self) {
        let (left, right) = tokio::io::duplex(DUPLEX_BUFFER_BYTES);
        let (left_read, left_write) = tokio::io::split(left);
        let (right_read, right_write) = tokio::io::split(right);
        (
            Self::new(left_read, left_write, max_frame_bytes),
            Self::new(right_read, right_write, max_frame_bytes),
        )
    }

    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::send`].
    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.writer.send(frame).await
    }

    /// Receives one frame.
    ///
    /// # Errors
    ///
    /// See [`FrameReader::receive`].
    pub async fn receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.reader.receive().await
    }

    /// Closes both halves. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`FrameWriter::close`].
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.reader.close();
        self.writer.close().await
    }

    /// Splits into independently owned halves.
    #[must_use]
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn reader_over(mock: tokio_test::io::Mock, max: usize) -> Transport {
        Transport::new(mock, tokio::io::sink(), max)
    }

    #[tokio::test]
    async fn receive_strips_line_endings() {
        let mock = Builder::new().read(b"{\"a\":1}\r\n{\"b\":2}\n").build();
        let mut transport = reader_over(mock, DEFAULT_MAX_FRAME_BYTES);

        assert_eq!(transport.receive().await.unwrap().unwrap(), b"{\"a\":1}");
        assert_eq!(transport.receive().await.unwrap().unwrap(), b"{\"b\":2}");
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_skips_blank_lines() {
        let mock = Builder::new().read(b"\n   \n{}\n").build();
        let mut transport = reader_over(mock, DEFAULT_MAX_FRAME_BYTES);

        assert_eq!(transport.receive().await.unwrap().unwrap(), b"{}");
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_final_frame_without_newline() {
        let mock = Builder::new().read(b"{}").build();
        let mut transport = reader_over(mock, DEFAULT_MAX_FRAME_BYTES);

        assert_eq!(transport.receive().await.unwrap().unwrap(), b"{}");
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_rejects_oversized_frame() {
        let mock = Builder::new().read(b"0123456789\n").build();
        let mut transport = reader_over(mock, 4);

        let err = transport.receive().await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn receive_after_close_is_end_of_stream() {
        let mock = Builder::new().build();
        let mut transport = reader_over(mock, DEFAULT_MAX_FRAME_BYTES);

        transport.close().await.unwrap();
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_appends_newline() {
        let mock = Builder::new().write(b"{\"x\":true}").write(b"\n").build();
        let mut transport = Transport::new(tokio::io::empty(), mock, DEFAULT_MAX_FRAME_BYTES);

        transport.send(b"{\"x\":true}").await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let (mut transport, _peer) = Transport::pair(DEFAULT_MAX_FRAME_BYTES);

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send(b"{}").await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn pair_delivers_in_order_and_signals_close() {
        let (mut left, mut right) = Transport::pair(DEFAULT_MAX_FRAME_BYTES);

        left.send(b"first").await.unwrap();
        left.send(b"second").await.unwrap();
        left.close().await.unwrap();

        assert_eq!(right.receive().await.unwrap().unwrap(), b"first");
        assert_eq!(right.receive().await.unwrap().unwrap(), b"second");
        assert!(right.receive().await.unwrap().is_none());
    }
}
