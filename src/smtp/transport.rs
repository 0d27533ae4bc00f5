//! Line-oriented transport over one accepted connection

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use crate::smtp::assembler::RawMessage;
use crate::smtp::error::{SmtpError, is_disconnect_kind};
use crate::smtp::response::SmtpResponse;

const LINE_END: &[u8] = b"\r\n";
const READ_CHUNK: usize = 4096;

/// A byte stream the transport can drive
pub trait Connection: Read + Write {
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn shutdown(&self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Owns one connection, the bytes read from it that do not yet form a line,
/// and the message currently being received on it.
#[derive(Debug)]
pub struct SmtpTransport<C: Connection> {
    connection: C,
    pending: Vec<u8>,
    message: RawMessage,
}

impl<C: Connection> SmtpTransport<C> {
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            pending: Vec::new(),
            message: RawMessage::new(),
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.peer_addr().ok()
    }

    /// Read the next CRLF-terminated line, without its terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. Bytes that
    /// are not UTF-8 are replaced; use [`read_line_raw`](Self::read_line_raw)
    /// where the octets matter.
    pub fn read_line(&mut self) -> Result<Option<String>, SmtpError> {
        Ok(self
            .read_line_raw()?
            .map(|line| String::from_utf8_lossy(&line).into_owned()))
    }

    /// Read the next CRLF-terminated line as received.
    ///
    /// A single receive may carry several lines or only part of one, so the
    /// pending buffer is scanned again before every receive.
    pub fn read_line_raw(&mut self) -> Result<Option<Vec<u8>>, SmtpError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.take_pending_line() {
                return Ok(Some(line));
            }

            match self.connection.read(&mut chunk) {
                Ok(0) => return Ok(None),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect_kind(e.kind()) => return Ok(None),
                Err(e) => return Err(SmtpError::Io(e)),
            }
        }
    }

    fn take_pending_line(&mut self) -> Option<Vec<u8>> {
        let end = self
            .pending
            .windows(LINE_END.len())
            .position(|window| window == LINE_END)?;
        let mut line: Vec<u8> = self.pending.drain(..end + LINE_END.len()).collect();
        line.truncate(end);
        Some(line)
    }

    /// Write one line followed by CRLF in a single send
    pub fn write_line(&mut self, text: &str) -> Result<(), SmtpError> {
        let mut line = String::with_capacity(text.len() + LINE_END.len());
        line.push_str(text);
        line.push_str("\r\n");
        self.send(line.as_bytes())
    }

    pub fn write_response(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        self.send(response.format().as_bytes())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), SmtpError> {
        self.connection.write_all(bytes)?;
        self.connection.flush()?;
        Ok(())
    }

    pub fn message(&self) -> &RawMessage {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut RawMessage {
        &mut self.message
    }

    /// Hand over the message received so far, leaving a fresh one behind
    pub fn take_message(&mut self) -> RawMessage {
        std::mem::take(&mut self.message)
    }

    /// Start over with a fresh message for the next transaction.
    ///
    /// Bytes already received but not yet read as a line are kept: they are
    /// commands the client sent after the previous transaction.
    pub fn reset(&mut self) {
        self.message = RawMessage::new();
    }

    /// Drop all buffered state and shut the connection down
    pub fn close(&mut self) {
        self.pending.clear();
        self.message = RawMessage::new();
        if let Err(e) = self.connection.shutdown() {
            tracing::debug!(error = %e, "shutdown after close failed");
        }
    }
}
