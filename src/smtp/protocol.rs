//! Drives one connection through the SMTP dialogue

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::smtp::commands::SmtpCommandHandler;
use crate::smtp::error::SmtpError;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::{SmtpSession, SmtpState};
use crate::smtp::store::MessageStore;
use crate::smtp::transport::{Connection, SmtpTransport};

/// Runs the command loop for a connection and files completed messages
#[derive(Debug)]
pub struct SmtpProtocol<'a> {
    handler: SmtpCommandHandler<'a>,
    store: &'a MessageStore,
}

impl<'a> SmtpProtocol<'a> {
    pub fn new(domain: &'a str, store: &'a MessageStore) -> Self {
        Self {
            handler: SmtpCommandHandler::new(domain),
            store,
        }
    }

    /// Serve the connection until QUIT or until the client goes away.
    ///
    /// Protocol errors are answered and the loop goes on; any other error
    /// ends this connection and is returned.
    pub fn run<C: Connection>(&self, transport: &mut SmtpTransport<C>) -> Result<(), SmtpError> {
        let mut session = SmtpSession::new(transport.peer_addr());
        transport.write_response(&SmtpResponse::greeting(self.handler.domain()))?;

        while let Some(line) = transport.read_line()? {
            debug!(peer = ?session.peer, command = %redact(&line), "command");

            let response = match self.handler.process_command(&line, &mut session, transport) {
                Ok(response) => response,
                Err(e) if e.is_protocol_error() => SmtpResponse::from_error(&e),
                Err(e) => return Err(e),
            };
            debug!(peer = ?session.peer, code = response.code, "reply");
            transport.write_response(&response)?;

            if response.is_closing() {
                break;
            }

            if session.state == SmtpState::InData && !self.receive_data(&mut session, transport)? {
                debug!(peer = ?session.peer, "client left during DATA");
                break;
            }
        }

        transport.close();
        Ok(())
    }

    /// Read message text up to the lone `.` and store the result.
    ///
    /// Returns `false` if the peer disconnected before the terminator.
    fn receive_data<C: Connection>(
        &self,
        session: &mut SmtpSession,
        transport: &mut SmtpTransport<C>,
    ) -> Result<bool, SmtpError> {
        let trace = self.trace_header(session);
        transport.message_mut().append_line(&trace);

        loop {
            let Some(line) = transport.read_line_raw()? else {
                return Ok(false);
            };
            if line == b"." {
                break;
            }
            // transparency: a leading dot was doubled by the client
            let line = line.strip_prefix(b".").unwrap_or(&line);
            transport.message_mut().append_line(line);
        }

        let raw = transport.message();
        debug!(
            peer = ?session.peer,
            sender = ?raw.sender(),
            recipients = ?raw.recipients(),
            size = raw.as_bytes().len(),
            "end of data"
        );
        let response = match transport.take_message().into_email() {
            Ok(email) => {
                info!(
                    peer = ?session.peer,
                    from = ?email.envelope_from,
                    recipients = ?email.envelope_to,
                    subject = ?email.subject,
                    "message received"
                );
                self.store.push(email);
                SmtpResponse::ok()
            }
            Err(e) => {
                warn!(peer = ?session.peer, error = %e, "message rejected");
                SmtpResponse::from_error(&e)
            }
        };

        transport.write_response(&response)?;
        transport.reset();
        session.reset();
        Ok(true)
    }

    fn trace_header(&self, session: &SmtpSession) -> String {
        let client = session.client_domain.as_deref().unwrap_or("unknown");
        let peer = session
            .peer
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "Received: from {client} ({peer}) by {}; {}",
            self.handler.domain(),
            Utc::now().to_rfc2822()
        )
    }
}

/// Keep credentials out of the logs
fn redact(line: &str) -> &str {
    if line.get(..4).is_some_and(|verb| verb.eq_ignore_ascii_case("AUTH")) {
        "AUTH ***"
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::transport::tests::ScriptedConnection;

    fn run_script(chunks: &[&str]) -> (String, MessageStore) {
        let store = MessageStore::new();
        let mut transport = SmtpTransport::new(ScriptedConnection::new(chunks));
        SmtpProtocol::new("server.test", &store)
            .run(&mut transport)
            .unwrap();
        (transport.connection_output(), store)
    }

    #[test]
    fn test_worked_example() {
        let (_, store) = run_script(&[
            "HELO client.test\r\n",
            "MAIL FROM:<a@test>\r\n",
            "RCPT TO:<b@test>\r\n",
            "DATA\r\n",
            "Subject: Hi\r\n\r\nHello\r\n.\r\n",
            "QUIT\r\n",
        ]);

        let messages = store.snapshot();
        assert_eq!(messages.len(), 1);
        let email = &messages[0];
        assert!(email.is_from_sender("a@test"));
        let to: Vec<&str> = email.to.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(to, vec!["b@test"]);
        assert_eq!(email.subject.as_deref(), Some("Hi"));
        assert_eq!(email.body.as_deref(), Some("Hello"));

        let received = email.header("Received").unwrap();
        assert!(received.starts_with("from client.test (127.0.0.1) by server.test;"));
        assert!(email.raw.starts_with("Received: from client.test"));
    }

    #[test]
    fn test_dot_unstuffing() {
        let (_, store) = run_script(&[
            "HELO client.test\r\nMAIL FROM:<a@test>\r\nRCPT TO:<b@test>\r\nDATA\r\n",
            "Subject: Dots\r\n\r\n..leading dot\r\n.\r\n",
        ]);

        let email = &store.snapshot()[0];
        assert_eq!(email.body.as_deref(), Some(".leading dot"));
    }

    #[test]
    fn test_multiple_messages_per_connection() {
        let (_, store) = run_script(&[
            "HELO client.test\r\n",
            "MAIL FROM:<a@test>\r\nRCPT TO:<b@test>\r\nDATA\r\nSubject: one\r\n\r\n1\r\n.\r\n",
            "MAIL FROM:<c@test>\r\nRCPT TO:<d@test>\r\nDATA\r\nSubject: two\r\n\r\n2\r\n.\r\n",
            "QUIT\r\n",
        ]);

        let messages = store.snapshot();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].is_from_sender("c@test"));
        assert_eq!(messages[1].envelope_to, vec!["d@test"]);
        assert_eq!(messages[1].body.as_deref(), Some("2"));
    }

    #[test]
    fn test_unparseable_message_rejected_and_session_continues() {
        let (output, store) = run_script(&[
            "HELO client.test\r\nMAIL FROM:<a@test>\r\nRCPT TO:<b@test>\r\nDATA\r\n",
            "Subject: broken\r\nContent-Transfer-Encoding: base64\r\n\r\n!!!!\r\n.\r\n",
            "MAIL FROM:<a@test>\r\nRCPT TO:<b@test>\r\nDATA\r\n",
            "Subject: fine\r\n\r\nok\r\n.\r\n",
            "QUIT\r\n",
        ]);

        let codes: Vec<&str> = output.lines().map(|line| &line[..3]).collect();
        assert_eq!(
            codes,
            vec!["220", "250", "250", "250", "354", "554", "250", "250", "354", "250", "221"]
        );
        assert!(output.contains("554 Transaction failed\r\n"));

        let messages = store.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject.as_deref(), Some("fine"));
    }

    #[test]
    fn test_8bit_data_reaches_the_parser_intact() {
        let store = MessageStore::new();
        let connection = ScriptedConnection::from_bytes([
            &b"HELO client.test\r\nMAIL FROM:<a@test>\r\nRCPT TO:<b@test>\r\nDATA\r\n"[..],
            &b"Content-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xe9\r\n.\r\n"[..],
        ]);
        let mut transport = SmtpTransport::new(connection);
        SmtpProtocol::new("server.test", &store)
            .run(&mut transport)
            .unwrap();

        assert_eq!(store.snapshot()[0].body.as_deref(), Some("caf\u{e9}"));
    }

    #[test]
    fn test_disconnect_during_data_stores_nothing() {
        let (_, store) = run_script(&[
            "HELO client.test\r\nMAIL FROM:<a@test>\r\nRCPT TO:<b@test>\r\nDATA\r\n",
            "Subject: cut\r\n\r\npartial",
        ]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_replies_on_the_wire() {
        let (output, store) = run_script(&[
            "RCPT TO:<b@test>\r\n",
            "HELO client.test\r\n",
            "BOGUS\r\n",
            "MAIL FROM:<broken>\r\n",
            "QUIT\r\n",
            "NOOP\r\n",
        ]);

        assert!(store.is_empty());
        let codes: Vec<&str> = output.lines().map(|line| &line[..3]).collect();
        assert_eq!(codes, vec!["220", "503", "250", "500", "451", "221"]);
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact("AUTH PLAIN c2VjcmV0"), "AUTH ***");
        assert_eq!(redact("auth plain"), "AUTH ***");
        assert_eq!(redact("NOOP"), "NOOP");
        assert_eq!(redact("A"), "A");
    }
}
