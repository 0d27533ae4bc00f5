//! # mailcatch
//!
//! mailcatch is an embedded SMTP server for testing.
//!
//! Point the code under test at it, send mail as usual, then inspect what
//! arrived: sender, recipients, subject, body, alternate views, attachments
//! and headers.
//!
//! ## Quick Start
//!
//! ```rust
//! use mailcatch::{ServerConfig, SmtpServer};
//! use std::io::{BufRead, BufReader, Write};
//! use std::net::TcpStream;
//!
//! // Bind to a free port on the loopback interface
//! let server = SmtpServer::new(ServerConfig::new().with_localhost());
//! let addr = server.start().unwrap();
//!
//! // Application sends email to `addr`
//! let mut stream = TcpStream::connect(addr).unwrap();
//! let mut reader = BufReader::new(stream.try_clone().unwrap());
//! let mut line = String::new();
//! reader.read_line(&mut line).unwrap();
//! for command in ["HELO app.test", "MAIL FROM:<a@test>", "RCPT TO:<b@test>", "DATA"] {
//!     write!(stream, "{command}\r\n").unwrap();
//!     line.clear();
//!     reader.read_line(&mut line).unwrap();
//! }
//! write!(stream, "Subject: Hi\r\n\r\nHello\r\n.\r\n").unwrap();
//! line.clear();
//! reader.read_line(&mut line).unwrap();
//!
//! // Check the contents of the sent email
//! let email = &server.received_messages()[0];
//! assert_eq!(email.subject.as_deref(), Some("Hi"));
//! assert_eq!(email.body.as_deref(), Some("Hello"));
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the client (`EHLO` advertises `AUTH PLAIN`)
//! - `MAIL FROM` - Specify the sender's address
//! - `RCPT TO` - Specify the destination (multiple destinations are supported)
//! - `DATA` - Send the email body
//! - `RSET` - Reset the current transaction
//! - `AUTH` - Accepted without checking credentials
//! - `NOOP` - Do nothing
//! - `QUIT` - Close connection
//!
//! ## Notes
//!
//! - Runs in-memory only. Email persistence is not supported.
//! - SSL/TLS connection is not supported.
//! - Mail relay is not supported.
//! - Each connection is served on its own thread.
//!
//! ## Recipients
//!
//! SMTP has no notion of Bcc. Envelope recipients that are not named in the
//! `To`, `Cc` or `Bcc` headers are added to [`Email::to`], so blind copies
//! show up as ordinary recipients.

mod smtp;

pub use smtp::{
    AlternateView, Attachment, Connection, Email, Header, Mailbox, MessageStore, RawMessage,
    ServerConfig, SmtpError, SmtpResponse, SmtpServer, SmtpSession, SmtpState, SmtpTransport,
};
