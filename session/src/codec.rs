//! Newline-delimited JSON framing.
//!
//! Every message in either direction is one UTF-8 JSON value followed by a
//! single `\n`. There is no length prefix. This module provides
//! [`FrameReader`] and [`FrameWriter`] for async reading and writing of
//! frames.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::error::TransportError;

pub const END_OF_MESSAGE: char = '\n';

/// Encode one frame: compact JSON plus the delimiter.
pub fn encode_frame(msg: &Value) -> Result<String, TransportError> {
    let mut frame = serde_json::to_string(msg)?;
    frame.push(END_OF_MESSAGE);
    Ok(frame)
}

/// Decode one line received from the peer. Surrounding whitespace, including
/// a trailing `\r`, is ignored.
pub fn decode_frame(line: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(line.trim())
}

/// Reads raw frames (lines) from an async reader.
///
/// Decoding is left to the caller so a malformed frame can be dropped without
/// tearing down the connection.
pub struct FrameReader<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }

    /// Read the next non-blank line.
    ///
    /// Returns `Ok(None)` on EOF. Cancel safe, so it can sit in a
    /// `tokio::select!` next to the writer queue.
    pub async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.lines.next_line().await? {
                Some(line) if line.trim().is_empty() => {}
                other => return Ok(other),
            }
        }
    }
}

/// Writes frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write an already-encoded frame and flush.
    pub async fn write_encoded(&mut self, frame: &str) -> Result<(), TransportError> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_frame(&mut self, msg: &Value) -> Result<(), TransportError> {
        let frame = encode_frame(msg)?;
        self.write_encoded(&frame).await
    }
}
