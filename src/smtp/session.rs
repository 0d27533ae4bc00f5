//! SMTP session state management

use std::net::SocketAddr;

/// Last command successfully accepted on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Nothing accepted yet - waiting for HELO/EHLO
    Unset,
    /// HELO/EHLO received - ready for MAIL
    Greeted,
    /// MAIL FROM received - ready for RCPT
    SenderSet,
    /// At least one RCPT TO received - ready for DATA or more RCPT
    RecipientSet,
    /// DATA accepted - collecting message text
    InData,
}

/// Protocol state of a single connection
#[derive(Debug)]
pub struct SmtpSession {
    pub state: SmtpState,
    /// Client domain from HELO/EHLO
    pub client_domain: Option<String>,
    pub peer: Option<SocketAddr>,
}

impl SmtpSession {
    pub fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            state: SmtpState::Unset,
            client_domain: None,
            peer,
        }
    }

    /// Record the client's domain and move to the greeted state
    pub fn greet(&mut self, domain: String) {
        self.client_domain = Some(domain);
        self.state = SmtpState::Greeted;
    }

    /// Leave any transaction, back to right after the greeting
    pub fn reset(&mut self) {
        self.state = if self.client_domain.is_some() {
            SmtpState::Greeted
        } else {
            SmtpState::Unset
        };
    }

    /// Check if the session is ready for a specific command
    pub fn can_execute_command(&self, command: &str) -> bool {
        match command {
            "HELO" => self.state == SmtpState::Unset,
            "MAIL" => self.state == SmtpState::Greeted,
            "RCPT" => matches!(self.state, SmtpState::SenderSet | SmtpState::RecipientSet),
            "RSET" => self.state != SmtpState::Unset,
            // lenient: DATA is taken in any state
            "DATA" | "EHLO" | "NOOP" | "AUTH" | "QUIT" => true,
            _ => false,
        }
    }
}

impl Default for SmtpSession {
    fn default() -> Self {
        Self::new(None)
    }
}
