//! Per-Connection Request Loop
//!
//! Each accepted client runs [`ConnectionHandler::run`] in its own task:
//!
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ read bytes   │──>│ parse frame  │──>│ execute      │──>│ write reply  │
//!   └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!          ▲                                                        │
//!          └────────────────────────────────────────────────────────┘
//! ```
//!
//! A framing error, or the peer closing with half a frame buffered, ends the
//! loop without writing anything for the offending request. Command-level
//! errors are ordinary replies and keep the connection open.

use crate::commands::{Command, CommandHandler};
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::{self, JoinError};
use tracing::{debug, info, trace, warn};

/// Ceiling on buffered bytes for a single incomplete request (8 MiB).
const MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Reasons a connection loop ends.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Clean close between requests.
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Close in the middle of a request frame.
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,

    #[error("Command task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Drives one client connection.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,
    addr: SocketAddr,
    buffer: BytesMut,
    command_handler: CommandHandler,
    parser: RespParser,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, addr: SocketAddr, command_handler: CommandHandler) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
        }
    }

    /// Serves requests until the peer disconnects or sends bad framing.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) | Err(ConnectionError::ClientDisconnected) => {
                info!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Closing connection"),
        }

        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(request) = self.try_parse_request()? {
                if let Some(reply) = self.execute(request).await? {
                    self.send_reply(&reply).await?;
                }
            }

            self.read_more_data().await?;
        }
    }

    /// Runs one request. Commands that do snapshot file I/O run on the
    /// blocking pool so a slow write or fsync never parks a runtime worker.
    async fn execute(&self, request: RespValue) -> Result<Option<RespValue>, ConnectionError> {
        match Command::of_request(&request) {
            Some(command) if command.touches_snapshot() => {
                let handler = self.command_handler.clone();
                Ok(task::spawn_blocking(move || handler.execute(request)).await?)
            }
            _ => Ok(self.command_handler.execute(request)),
        }
    }

    /// Pops one complete request off the front of the buffer, if present.
    fn try_parse_request(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer)? {
            Some((value, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                Ok(Some(value))
            }
            None => {
                trace!(client = %self.addr, buffered = self.buffer.len(), "Incomplete request");
                Ok(None)
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    async fn send_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), "Sent reply");
        Ok(())
    }
}

/// Runs a [`ConnectionHandler`] to completion, swallowing the close reason.
pub async fn handle_connection<S>(stream: S, addr: SocketAddr, command_handler: CommandHandler)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let _ = ConnectionHandler::new(stream, addr, command_handler)
        .run()
        .await;
}
