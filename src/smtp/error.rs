//! Error types for the SMTP server

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("Invalid command")]
    InvalidCommand,

    #[error("Invalid state for command")]
    InvalidState,

    #[error("Incorrect number of arguments")]
    InvalidArguments,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Server is already running")]
    AlreadyRunning,
}

impl SmtpError {
    /// Reply code sent to the client for this error
    pub fn reply_code(&self) -> u16 {
        match self {
            SmtpError::InvalidCommand => 500,
            SmtpError::InvalidArguments => 501,
            SmtpError::InvalidState => 503,
            SmtpError::InvalidAddress(_) => 451,
            SmtpError::Parse(_) => 554,
            SmtpError::Io(_) | SmtpError::AlreadyRunning => 421,
        }
    }

    pub fn reply_text(&self) -> &'static str {
        match self {
            SmtpError::InvalidCommand => "Command Unrecognized.",
            SmtpError::InvalidArguments => "Incorrect number of arguments.",
            SmtpError::InvalidState => "Command not allowed here.",
            SmtpError::InvalidAddress(_) => "Address is invalid.",
            SmtpError::Parse(_) => "Transaction failed",
            SmtpError::Io(_) | SmtpError::AlreadyRunning => "Service not available",
        }
    }

    /// Whether the error is recovered locally by replying and keeping the
    /// connection open.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SmtpError::InvalidCommand
                | SmtpError::InvalidState
                | SmtpError::InvalidArguments
                | SmtpError::InvalidAddress(_)
        )
    }

    /// Whether the error means the peer went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SmtpError::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}

pub(crate) fn is_disconnect_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_codes() {
        assert_eq!(SmtpError::InvalidCommand.reply_code(), 500);
        assert_eq!(SmtpError::InvalidState.reply_code(), 503);
        assert_eq!(SmtpError::InvalidArguments.reply_code(), 501);
        assert_eq!(SmtpError::InvalidAddress("x".to_string()).reply_code(), 451);
        assert_eq!(
            SmtpError::InvalidArguments.reply_text(),
            "Incorrect number of arguments."
        );
    }

    #[test]
    fn test_disconnect_classification() {
        let reset = SmtpError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());
        assert!(!reset.is_protocol_error());

        let other = SmtpError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!other.is_disconnect());

        assert!(SmtpError::InvalidState.is_protocol_error());
        assert!(!SmtpError::InvalidState.is_disconnect());
    }
}
