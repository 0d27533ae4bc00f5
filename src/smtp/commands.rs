//! Implementation of SMTP commands

use std::sync::LazyLock;

use regex::Regex;

use crate::smtp::error::SmtpError;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{SmtpSession, SmtpState};
use crate::smtp::transport::{Connection, SmtpTransport};

/// `FROM:<local@domain>` or `TO:<local@domain>`
static PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(FROM|TO):\s*<([^<>\s@]+@[^<>\s@]+)>").expect("path pattern is valid")
});

/// Handles SMTP commands and returns appropriate responses
#[derive(Debug)]
pub struct SmtpCommandHandler<'a> {
    domain: &'a str,
}

impl<'a> SmtpCommandHandler<'a> {
    /// Create a new command handler for a server answering as `domain`
    pub fn new(domain: &'a str) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> &str {
        self.domain
    }

    /// Process a command line and return a response.
    ///
    /// Protocol errors come back as `Err` and leave the session untouched;
    /// the caller turns them into replies.
    pub fn process_command<C: Connection>(
        &self,
        command_line: &str,
        session: &mut SmtpSession,
        transport: &mut SmtpTransport<C>,
    ) -> Result<SmtpResponse, SmtpError> {
        let (verb, args) = command_line
            .split_once(' ')
            .unwrap_or((command_line, ""));
        let verb = verb.to_uppercase();
        let args = args.trim();

        match verb.as_str() {
            "HELO" => self.handle_helo(args, session),
            "EHLO" => self.handle_ehlo(args, session, transport),
            "MAIL" => self.handle_mail(args, session, transport),
            "RCPT" => self.handle_rcpt(args, session, transport),
            "DATA" => self.handle_data(session),
            "RSET" => self.handle_rset(session, transport),
            "NOOP" => Ok(SmtpResponse::ok()),
            "AUTH" => Ok(SmtpResponse::auth_ok()),
            "QUIT" => Ok(SmtpResponse::quit()),
            _ => Err(SmtpError::InvalidCommand),
        }
    }

    fn handle_helo(&self, args: &str, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("HELO") {
            return Err(SmtpError::InvalidState);
        }

        let mut parts = args.split_whitespace();
        let (Some(domain), None) = (parts.next(), parts.next()) else {
            return Err(SmtpError::InvalidArguments);
        };

        session.greet(domain.to_string());
        Ok(SmtpResponse::helo(domain))
    }

    /// EHLO is accepted at any point and starts over like RSET
    fn handle_ehlo<C: Connection>(
        &self,
        args: &str,
        session: &mut SmtpSession,
        transport: &mut SmtpTransport<C>,
    ) -> Result<SmtpResponse, SmtpError> {
        let domain = args.split_whitespace().next().unwrap_or(self.domain);

        transport.reset();
        session.greet(domain.to_string());
        Ok(SmtpResponse::ehlo(domain))
    }

    fn handle_mail<C: Connection>(
        &self,
        args: &str,
        session: &mut SmtpSession,
        transport: &mut SmtpTransport<C>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("MAIL") {
            return Err(SmtpError::InvalidState);
        }

        let address = parse_path(args, "FROM")?;
        transport.message_mut().set_sender(address);
        session.state = SmtpState::SenderSet;
        Ok(SmtpResponse::ok())
    }

    fn handle_rcpt<C: Connection>(
        &self,
        args: &str,
        session: &mut SmtpSession,
        transport: &mut SmtpTransport<C>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RCPT") {
            return Err(SmtpError::InvalidState);
        }

        let address = parse_path(args, "TO")?;
        transport.message_mut().add_recipient(address);
        session.state = SmtpState::RecipientSet;
        Ok(SmtpResponse::ok())
    }

    /// Switch to data mode; the caller reads the message text
    fn handle_data(&self, session: &mut SmtpSession) -> Result<SmtpResponse, SmtpError> {
        session.state = SmtpState::InData;
        Ok(SmtpResponse::data_start())
    }

    fn handle_rset<C: Connection>(
        &self,
        session: &mut SmtpSession,
        transport: &mut SmtpTransport<C>,
    ) -> Result<SmtpResponse, SmtpError> {
        if !session.can_execute_command("RSET") {
            return Err(SmtpError::InvalidState);
        }

        transport.reset();
        session.reset();
        Ok(SmtpResponse::ok())
    }
}

/// Extract the address from a `FROM:<...>` / `TO:<...>` argument
fn parse_path(args: &str, keyword: &str) -> Result<String, SmtpError> {
    PATH.captures(args)
        .filter(|caps| caps[1].eq_ignore_ascii_case(keyword))
        .map(|caps| caps[2].to_string())
        .ok_or_else(|| SmtpError::InvalidAddress(args.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::transport::tests::ScriptedConnection;

    struct Fixture {
        session: SmtpSession,
        transport: SmtpTransport<ScriptedConnection>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                session: SmtpSession::new(None),
                transport: SmtpTransport::new(ScriptedConnection::new(&[])),
            }
        }

        fn run(&mut self, line: &str) -> Result<SmtpResponse, SmtpError> {
            SmtpCommandHandler::new("test.local").process_command(
                line,
                &mut self.session,
                &mut self.transport,
            )
        }
    }

    #[test]
    fn test_helo_command() {
        let mut fx = Fixture::new();
        let response = fx.run("HELO client.local").unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(response.text, "client.local");
        assert_eq!(fx.session.client_domain.as_deref(), Some("client.local"));
        assert_eq!(fx.session.state, SmtpState::Greeted);
    }

    #[test]
    fn test_helo_argument_count() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.run("HELO"), Err(SmtpError::InvalidArguments)));
        assert!(matches!(fx.run("HELO a b"), Err(SmtpError::InvalidArguments)));
        assert_eq!(fx.session.state, SmtpState::Unset);
    }

    #[test]
    fn test_second_helo_not_allowed() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();
        assert!(matches!(fx.run("HELO other.local"), Err(SmtpError::InvalidState)));
        assert_eq!(fx.session.client_domain.as_deref(), Some("client.local"));
    }

    #[test]
    fn test_ehlo_advertises_auth() {
        let mut fx = Fixture::new();
        let response = fx.run("ehlo client.local").unwrap();
        assert_eq!(response.format(), "250-client.local\r\n250 AUTH PLAIN\r\n");
        assert_eq!(fx.session.state, SmtpState::Greeted);
    }

    #[test]
    fn test_mail_command() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();

        let response = fx.run("MAIL FROM:<sender@example.com>").unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(fx.session.state, SmtpState::SenderSet);
        assert_eq!(fx.transport.message().sender(), Some("sender@example.com"));
    }

    #[test]
    fn test_mail_without_helo() {
        let mut fx = Fixture::new();
        let result = fx.run("MAIL FROM:<sender@example.com>");
        assert!(matches!(result, Err(SmtpError::InvalidState)));
        assert_eq!(fx.session.state, SmtpState::Unset);
    }

    #[test]
    fn test_mail_twice_is_out_of_order() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();
        fx.run("MAIL FROM:<first@example.com>").unwrap();

        let result = fx.run("MAIL FROM:<second@example.com>");
        assert!(matches!(result, Err(SmtpError::InvalidState)));
        assert_eq!(fx.transport.message().sender(), Some("first@example.com"));
    }

    #[test]
    fn test_mail_invalid_address() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();

        for bad in [
            "MAIL sender@example.com",
            "MAIL FROM:sender@example.com",
            "MAIL FROM:<>",
            "MAIL FROM:<no-at-sign>",
            "MAIL TO:<sender@example.com>",
        ] {
            let result = fx.run(bad);
            assert!(
                matches!(result, Err(SmtpError::InvalidAddress(_))),
                "{bad} should be rejected"
            );
        }
        assert_eq!(fx.session.state, SmtpState::Greeted);
    }

    #[test]
    fn test_mail_accepts_space_and_parameters() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();
        fx.run("mail from: <sender@example.com> BODY=8BITMIME").unwrap();
        assert_eq!(fx.transport.message().sender(), Some("sender@example.com"));
    }

    #[test]
    fn test_rcpt_command() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();
        fx.run("MAIL FROM:<sender@example.com>").unwrap();

        fx.run("RCPT TO:<one@example.com>").unwrap();
        let response = fx.run("RCPT TO:<two@example.com>").unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(fx.session.state, SmtpState::RecipientSet);
        assert_eq!(
            fx.transport.message().recipients(),
            ["one@example.com", "two@example.com"]
        );
    }

    #[test]
    fn test_rcpt_without_mail() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();

        let result = fx.run("RCPT TO:<recipient@example.com>");
        assert!(matches!(result, Err(SmtpError::InvalidState)));
        assert!(fx.transport.message().recipients().is_empty());
    }

    #[test]
    fn test_rcpt_invalid_address() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();
        fx.run("MAIL FROM:<sender@example.com>").unwrap();

        let result = fx.run("RCPT TO:<broken>");
        assert!(matches!(result, Err(SmtpError::InvalidAddress(_))));
        assert!(fx.transport.message().recipients().is_empty());
        assert_eq!(fx.session.state, SmtpState::SenderSet);
    }

    #[test]
    fn test_data_command_in_any_state() {
        let mut fx = Fixture::new();
        let response = fx.run("DATA").unwrap();
        assert_eq!(response.code, 354);
        assert_eq!(fx.session.state, SmtpState::InData);
    }

    #[test]
    fn test_rset_command() {
        let mut fx = Fixture::new();
        fx.run("HELO client.local").unwrap();
        fx.run("MAIL FROM:<sender@example.com>").unwrap();
        fx.run("RCPT TO:<recipient@example.com>").unwrap();

        let response = fx.run("RSET").unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(fx.session.state, SmtpState::Greeted);
        assert!(fx.transport.message().sender().is_none());
        assert!(fx.transport.message().recipients().is_empty());
    }

    #[test]
    fn test_rset_before_greeting() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.run("RSET"), Err(SmtpError::InvalidState)));
    }

    #[test]
    fn test_stateless_commands() {
        let mut fx = Fixture::new();
        assert_eq!(fx.run("NOOP").unwrap().code, 250);
        assert_eq!(fx.run("AUTH PLAIN AHVzZXIAcGFzcw==").unwrap().code, 235);
        assert_eq!(fx.run("QUIT").unwrap().code, 221);
        assert_eq!(fx.session.state, SmtpState::Unset);
    }

    #[test]
    fn test_invalid_command() {
        let mut fx = Fixture::new();
        assert!(matches!(fx.run("INVALID"), Err(SmtpError::InvalidCommand)));
        assert!(matches!(fx.run(""), Err(SmtpError::InvalidCommand)));
    }
}
