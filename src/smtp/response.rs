//! SMTP replies

use std::fmt::Write as _;

use crate::smtp::error::SmtpError;

/// One reply to a client command.
///
/// `text` goes on the first line; each entry of `extra` becomes a further
/// line of the same reply (`250-first`, `250-...`, `250 last`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    pub code: u16,
    pub text: String,
    pub extra: Vec<String>,
}

impl SmtpResponse {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            extra: Vec::new(),
        }
    }

    /// Append a continuation line
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.extra.push(line.into());
        self
    }

    pub fn ok() -> Self {
        Self::new(250, "OK")
    }

    /// Banner sent as soon as a connection is accepted
    pub fn greeting(domain: &str) -> Self {
        Self::new(220, format!("{domain} SMTP service ready"))
    }

    /// HELO echoes the client's domain back
    pub fn helo(client_domain: &str) -> Self {
        Self::new(250, client_domain)
    }

    /// EHLO echoes the domain and advertises plain authentication
    pub fn ehlo(client_domain: &str) -> Self {
        Self::new(250, client_domain).with_line("AUTH PLAIN")
    }

    pub fn data_start() -> Self {
        Self::new(354, "Start mail input; end with <CRLF>.<CRLF>")
    }

    pub fn auth_ok() -> Self {
        Self::new(235, "Authentication successful.")
    }

    pub fn quit() -> Self {
        Self::new(221, "Goodbye.")
    }

    pub fn from_error(error: &SmtpError) -> Self {
        Self::new(error.reply_code(), error.reply_text())
    }

    /// Wire form, every line CRLF-terminated
    pub fn format(&self) -> String {
        let lines = std::iter::once(self.text.as_str()).chain(self.extra.iter().map(String::as_str));
        let last = self.extra.len();

        let mut out = String::new();
        for (i, line) in lines.enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            // writing into a String cannot fail
            let _ = write!(out, "{}{sep}{line}\r\n", self.code);
        }
        out
    }

    pub fn is_closing(&self) -> bool {
        self.code == 221
    }
}
