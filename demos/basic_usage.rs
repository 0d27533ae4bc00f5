//! Basic usage example for the mailcatch SMTP server
//!
//! Starts an in-memory server on a free loopback port, sends two messages
//! over a plain TCP connection and prints what the server captured.

use mailcatch::{ServerConfig, SmtpServer};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

fn main() {
    println!("mailcatch Basic Usage Example");
    println!("=============================");

    let server = SmtpServer::new(
        ServerConfig::new()
            .with_domain("example.local")
            .with_localhost(),
    );
    let rx = server.subscribe();

    let addr = match server.start() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Server error: {e}");
            return;
        }
    };
    println!("Server started on {addr}");

    println!("\nSending test email...");
    if let Err(e) = send_test_email(addr) {
        eprintln!("Failed to send email: {e}");
        return;
    }

    println!("\nWaiting for email...");
    match rx.recv_timeout(Duration::from_secs(1)) {
        Ok(email) => {
            println!("Email received:");
            if let Some(from) = &email.from {
                println!("  From: {from}");
            }
            for to in &email.to {
                println!("  To: {to}");
            }
            println!("  Subject: {}", email.subject.as_deref().unwrap_or(""));
            println!("  Received: {}", email.received_at.to_rfc2822());
            println!("  Body:");
            for line in email.body.as_deref().unwrap_or("").lines() {
                println!("    {line}");
            }
        }
        Err(_) => {
            eprintln!("Timeout: No email received within 1 second");
            return;
        }
    }

    println!("\nSending second test email...");
    if let Err(e) = send_second_test_email(addr) {
        eprintln!("Failed to send second email: {e}");
        return;
    }

    println!("\nCollected {} email(s) total", server.received_messages_count());

    let emails = server.received_messages();
    let for_recipient = emails
        .iter()
        .filter(|email| email.has_recipient("recipient@example.com"))
        .count();
    println!("Emails for recipient@example.com: {for_recipient}");

    let from_sender = emails
        .iter()
        .filter(|email| email.is_from_sender("sender@example.com"))
        .count();
    println!("Emails from sender@example.com: {from_sender}");

    server.stop();
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
    echo: bool,
}

impl Client {
    fn connect(addr: SocketAddr, echo: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(addr)?;
        let reader = BufReader::new(stream.try_clone()?);
        let mut client = Self {
            stream,
            reader,
            echo,
        };
        client.reply()?;
        Ok(client)
    }

    fn reply(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line)?;
            if self.echo {
                print!("S: {line}");
            }
            // Continuation lines of a multiline reply look like "250-..."
            if line.as_bytes().get(3) != Some(&b'-') {
                return Ok(());
            }
        }
    }

    fn command(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error>> {
        if self.echo {
            println!("C: {line}");
        }
        write!(self.stream, "{line}\r\n")?;
        self.reply()
    }

    fn data(&mut self, lines: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
        self.command("DATA")?;
        for line in lines {
            write!(self.stream, "{line}\r\n")?;
        }
        self.command(".")
    }
}

fn send_test_email(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect(addr, true)?;
    client.command("EHLO client.example.com")?;
    client.command("MAIL FROM:<sender@example.com>")?;
    client.command("RCPT TO:<recipient@example.com>")?;
    client.data(&[
        "From: Sender <sender@example.com>",
        "To: recipient@example.com",
        "Subject: Test Email from mailcatch",
        "",
        "This is a test email sent to demonstrate",
        "the mailcatch SMTP server functionality.",
        "",
        "Best regards,",
        "mailcatch Example",
    ])?;
    client.command("QUIT")
}

fn send_second_test_email(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect(addr, false)?;
    client.command("HELO client.example.com")?;
    client.command("MAIL FROM:<sender@example.com>")?;
    client.command("RCPT TO:<recipient@example.com>")?;
    client.command("RCPT TO:<another@example.com>")?;
    client.data(&[
        "From: sender@example.com",
        "To: recipient@example.com, another@example.com",
        "Subject: Second Test Email",
        "",
        "This is the second test email with multiple recipients.",
    ])?;
    client.command("QUIT")
}
