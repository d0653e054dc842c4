//! Paced delivery of a response body.
//!
//! Bytes are released in fixed ticks of [`TICK`]: each tick writes at most
//! `bytes_per_second / 10` bytes and waits for the write to be accepted
//! before sleeping until the next tick.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{FixtureError, Result};

/// Interval between two paced writes.
pub const TICK: Duration = Duration::from_millis(100);

const TICKS_PER_SECOND: f64 = 10.0;

/// How a throttled response is paced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThrottleRate {
    /// Spread the whole body over this duration.
    ResponseTime(Duration),
    /// Deliver at a steady bitrate.
    BitsPerSecond(u64),
}

impl ThrottleRate {
    /// Byte rate for a body of `body_len` bytes.
    pub fn bytes_per_second(&self, body_len: usize) -> f64 {
        match self {
            Self::ResponseTime(duration) => {
                let millis = duration.as_millis().max(1) as f64;
                body_len as f64 * 1000.0 / millis
            }
            Self::BitsPerSecond(bits) => *bits as f64 / 8.0,
        }
    }
}

/// Cursor over a body that hands out one tick's worth of bytes at a time.
#[derive(Debug, Clone)]
pub struct ThrottleCursor {
    data: Bytes,
    offset: usize,
    chunk_size: usize,
}

impl ThrottleCursor {
    pub fn new(data: Bytes, bytes_per_second: f64) -> Self {
        // Very low rates still move at least one byte per tick.
        let chunk_size = ((bytes_per_second / TICKS_PER_SECOND).floor() as usize).max(1);
        Self {
            data,
            offset: 0,
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }

    /// Next slice of the body, or `None` once everything has been handed out.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        if self.is_done() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Some(chunk)
    }
}

/// Destination of paced chunks, usually an HTTP response body.
#[async_trait]
pub trait ChunkSink: Send {
    /// Completes once the chunk has been accepted. An error means the peer is
    /// gone and no further chunks may be written.
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()>;
}

#[async_trait]
impl ChunkSink for mpsc::Sender<std::io::Result<Bytes>> {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.send(Ok(chunk))
            .await
            .map_err(|_| FixtureError::write("response body was dropped by the client"))
    }
}

/// Writes `data` to `sink` at roughly `bytes_per_second`.
///
/// Stops at the first failed write and returns its error; nothing is retried.
pub async fn write_throttled<S>(data: Bytes, sink: &mut S, bytes_per_second: f64) -> Result<()>
where
    S: ChunkSink + ?Sized,
{
    let mut cursor = ThrottleCursor::new(data, bytes_per_second);
    trace!(
        bytes = cursor.remaining(),
        chunk_size = cursor.chunk_size(),
        "Starting throttled write"
    );

    while let Some(chunk) = cursor.next_chunk() {
        sink.write_chunk(chunk).await?;
        if cursor.is_done() {
            break;
        }
        tokio::time::sleep(TICK).await;
    }
    Ok(())
}
