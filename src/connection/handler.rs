//! Connection Session
//!
//! Each client connection runs its own session loop:
//!
//! ```text
//! 1. Client connects, session spawned
//!        │
//!        ▼
//! 2. ┌──────────────────────────────┐
//!    │  read_command()              │ <── waits for a full frame
//!    │        │                     │
//!    │        ▼                     │
//!    │  CommandHandler::execute()   │
//!    │        │                     │
//!    │        ▼                     │
//!    │  send_response()             │ <── write + flush
//!    │        │                     │
//!    │   [Loop back]                │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 3. End of stream, malformed frame or I/O error: session ends
//! ```
//!
//! The session is generic over the byte stream, so it runs the same way on
//! a `TcpStream` and on an in-memory pipe.
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. A single read may carry a
//! partial frame or several pipelined frames; frames are taken off the
//! front one at a time and answered in order.

use crate::commands::CommandHandler;
use crate::protocol::parser::{skip_blank_lines, MAX_BULK_SIZE};
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Upper bound on buffered, not yet parsed input: one maximal bulk string
/// plus room for its framing.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame; there is no resynchronization.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The peer closed the stream in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

impl ConnectionError {
    /// True for the peer resetting or aborting the connection.
    fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ConnectionError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            )
        )
    }
}

/// One client session over a bidirectional byte stream.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,

    /// Peer label for logging
    peer: String,

    /// Bytes read but not yet parsed
    buffer: BytesMut,

    command_handler: CommandHandler,

    parser: RespParser,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            peer: peer.into(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Runs the session until the peer closes the stream (`Ok`) or an error
    /// ends it.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.peer, "Client connected");

        let result = self.main_loop().await;
        if result.is_ok() {
            info!(client = %self.peer, "Client disconnected");
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while let Some(command) = self.read_command().await? {
            let response = self.command_handler.execute(command);
            self.stats.command_processed();
            self.send_response(&response).await?;
        }
        Ok(())
    }

    /// Waits for the next command frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream between frames.
    pub async fn read_command(&mut self) -> Result<Option<Vec<RespValue>>, ConnectionError> {
        loop {
            if let Some(command) = self.try_parse_command()? {
                return Ok(Some(command));
            }

            if !self.read_more_data().await? {
                return Ok(None);
            }
        }
    }

    /// Takes one complete command frame off the front of the buffer.
    fn try_parse_command(&mut self) -> Result<Option<Vec<RespValue>>, ConnectionError> {
        let blank = skip_blank_lines(&self.buffer);
        self.buffer.advance(blank);
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.peer,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );

                match value.into_array() {
                    Some(args) if !args.is_empty() => Ok(Some(args)),
                    _ => Err(ConnectionError::Parse(ParseError::ProtocolError(
                        "expected a non-empty array as command frame".to_string(),
                    ))),
                }
            }
            Ok(None) => {
                trace!(
                    client = %self.peer,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.peer, error = %e, "Parse error");
                Err(ConnectionError::Parse(e))
            }
        }
    }

    /// Reads more bytes into the buffer. Returns `false` on a clean end of
    /// stream.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.peer,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return if self.buffer.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.peer, bytes = n, "Read data");
        Ok(true)
    }

    /// Writes one reply and flushes it.
    pub async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(client = %self.peer, bytes = bytes.len(), "Sent response");
        Ok(())
    }
}

/// Runs a session to completion and logs how it ended.
pub async fn handle_connection<S>(
    stream: S,
    peer: impl Into<String>,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, peer, command_handler, stats);
    let peer = handler.peer.clone();

    if let Err(e) = handler.run().await {
        if e.is_disconnect() {
            debug!(client = %peer, error = %e, "Connection reset by client");
        } else {
            warn!(client = %peer, error = %e, "Connection closed with error");
        }
    }
}
