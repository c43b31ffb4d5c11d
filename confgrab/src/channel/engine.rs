//! Send/expect engine over a device transport.

use std::ops::Range;
use std::time::Duration;

use bytes::Bytes;
use log::trace;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use super::buffer::ExpectBuffer;
use super::patterns::Pattern;
use crate::error::ChannelError;

/// Configuration for expect engine behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default timeout for `expect`.
    #[serde(with = "crate::scheduler::config::secs")]
    pub timeout: Duration,

    /// Appended to every `send`.
    pub line_terminator: String,

    /// Remove ANSI escape sequences from received output.
    pub strip_ansi: bool,

    /// Upper bound for a single transport read.
    pub read_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            line_terminator: "\n".to_string(),
            strip_ansi: true,
            read_chunk_size: 4096,
        }
    }
}

/// Where the engine is in its send/expect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No expect has run yet, or the buffer was reset.
    Idle,
    /// Waiting inside `expect` for more bytes.
    Reading,
    /// The last expect matched.
    Matched,
    /// The last expect timed out. The buffer is intact.
    TimedOut,
    /// The transport reached end of stream.
    Eof,
    /// `close` was called.
    Closed,
}

/// Successful match returned by [`ExpectEngine::expect`].
#[derive(Debug, Clone)]
pub struct ExpectMatch {
    /// Index of the pattern that matched, for multi-pattern expects.
    pub pattern_index: usize,

    /// Absolute offsets of the match in the engine buffer.
    pub span: Range<usize>,

    /// Everything consumed by this expect, up to and including the match.
    consumed: Bytes,

    /// Start of the match within `consumed`.
    match_start: usize,
}

impl ExpectMatch {
    /// Bytes consumed by this expect.
    pub fn consumed(&self) -> &Bytes {
        &self.consumed
    }

    /// Bytes received before the match.
    pub fn before(&self) -> &[u8] {
        &self.consumed[..self.match_start]
    }

    /// The matched bytes themselves.
    pub fn matched(&self) -> &[u8] {
        &self.consumed[self.match_start..]
    }

    /// Text before the match (lossy UTF-8).
    pub fn before_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.before())
    }

    /// Matched text (lossy UTF-8).
    pub fn matched_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.matched())
    }
}

/// Drives send/expect exchanges over one transport.
///
/// The engine owns the transport for its whole lifetime. Dropping the
/// engine drops the transport, which closes the underlying connection,
/// so a session that unwinds or is cancelled mid-expect still releases it.
pub struct ExpectEngine<T> {
    transport: T,

    /// Configuration for this engine.
    config: EngineConfig,

    /// Received output and consumption cursor.
    buffer: ExpectBuffer,

    state: EngineState,

    /// Prefix for log lines (usually the device id).
    label: String,
}

impl<T> ExpectEngine<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new engine over `transport`.
    pub fn new(transport: T, config: EngineConfig) -> Self {
        Self {
            transport,
            buffer: ExpectBuffer::new(config.strip_ansi),
            config,
            state: EngineState::Idle,
            label: String::from("session"),
        }
    }

    /// Create an engine with default configuration.
    pub fn with_defaults(transport: T) -> Self {
        Self::new(transport, EngineConfig::default())
    }

    /// Set the label used in log lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Write `text` followed by the line terminator.
    pub async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        let mut line = Vec::with_capacity(text.len() + self.config.line_terminator.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(self.config.line_terminator.as_bytes());
        self.send_raw(&line).await
    }

    /// Write bytes as-is, without a line terminator.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if self.state == EngineState::Closed {
            return Err(ChannelError::Write(std::io::ErrorKind::NotConnected.into()));
        }
        self.transport
            .write_all(data)
            .await
            .map_err(ChannelError::Write)?;
        self.transport.flush().await.map_err(ChannelError::Write)?;
        trace!("{}: sent {} bytes", self.label, data.len());
        Ok(())
    }

    /// Wait for `pattern` using the default timeout.
    pub async fn expect(&mut self, pattern: &Pattern) -> Result<ExpectMatch, ChannelError> {
        self.expect_timeout(pattern, self.config.timeout).await
    }

    /// Wait for `pattern` for at most `timeout`.
    pub async fn expect_timeout(
        &mut self,
        pattern: &Pattern,
        timeout: Duration,
    ) -> Result<ExpectMatch, ChannelError> {
        self.expect_any(&[pattern], timeout).await
    }

    /// Wait for whichever of `patterns` matches earliest in the output.
    pub async fn expect_any(
        &mut self,
        patterns: &[&Pattern],
        timeout: Duration,
    ) -> Result<ExpectMatch, ChannelError> {
        self.expect_until(patterns, Instant::now() + timeout, timeout)
            .await
    }

    /// Like [`expect_any`](Self::expect_any) but bounded by an absolute
    /// deadline. `budget` is what a timeout error reports.
    pub async fn expect_until(
        &mut self,
        patterns: &[&Pattern],
        deadline: Instant,
        budget: Duration,
    ) -> Result<ExpectMatch, ChannelError> {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        self.state = EngineState::Reading;

        loop {
            // Data left over from earlier reads may already satisfy us.
            if let Some((pattern_index, span)) = self.buffer.find(patterns) {
                return Ok(self.accept(pattern_index, span));
            }

            let read = tokio::time::timeout_at(deadline, self.transport.read(&mut chunk)).await;
            match read {
                Err(_) => {
                    self.state = EngineState::TimedOut;
                    trace!(
                        "{}: timed out after {:?} with {} unconsumed bytes",
                        self.label,
                        budget,
                        self.buffer.unconsumed().len()
                    );
                    return Err(ChannelError::Timeout {
                        timeout: budget,
                        buffer: self.buffer.snapshot(),
                    });
                }
                Ok(Err(e)) => {
                    self.state = EngineState::Eof;
                    return Err(ChannelError::Read(e));
                }
                Ok(Ok(0)) => {
                    self.state = EngineState::Eof;
                    return Err(ChannelError::Eof {
                        buffer: self.buffer.snapshot(),
                    });
                }
                Ok(Ok(n)) => {
                    let kept = self.buffer.extend(&chunk[..n]);
                    trace!("{}: read {} bytes ({} kept)", self.label, n, kept);
                }
            }
        }
    }

    fn accept(&mut self, pattern_index: usize, span: Range<usize>) -> ExpectMatch {
        let match_start = span.start - self.buffer.cursor();
        let consumed = self.buffer.consume_through(span.end);
        self.state = EngineState::Matched;
        ExpectMatch {
            pattern_index,
            span,
            consumed,
            match_start,
        }
    }

    /// Change the default timeout. Buffered data is kept.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Change what [`send`](Self::send) appends to each line.
    pub fn set_line_terminator(&mut self, terminator: impl Into<String>) {
        self.config.line_terminator = terminator.into();
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Unconsumed output, for diagnostics after a failed expect.
    pub fn last_buffer(&self) -> Bytes {
        self.buffer.snapshot()
    }

    /// Get a reference to the buffer.
    pub fn buffer(&self) -> &ExpectBuffer {
        &self.buffer
    }

    /// Discard all buffered data and start a new phase.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.state = EngineState::Idle;
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shut the transport down. Further sends fail.
    pub async fn close(&mut self) -> std::io::Result<()> {
        if self.state == EngineState::Closed {
            return Ok(());
        }
        self.state = EngineState::Closed;
        self.transport.shutdown().await
    }

    /// Take the transport back.
    pub fn into_inner(self) -> T {
        self.transport
    }
}
