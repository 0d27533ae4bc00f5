//! Structured representation of a captured message

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// A single address with an optional display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: String,
}

impl Mailbox {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: address.into(),
        }
    }

    /// Compare addresses the way mail systems do (case-insensitive)
    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// A header field as it appeared in the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A non-body part of the message
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name from the content disposition or content type, if any
    pub name: Option<String>,
    /// Content decoded from its transfer encoding
    pub content: Vec<u8>,
    pub content_type: String,
    pub transfer_encoding: String,
    pub content_id: Option<String>,
    /// Parameters of the Content-Disposition header
    pub disposition_params: BTreeMap<String, String>,
}

/// One representation of the body of a `multipart/alternative` message
#[derive(Debug, Clone)]
pub struct AlternateView {
    pub content_type: String,
    pub charset: String,
    pub content: String,
    pub transfer_encoding: String,
    pub content_id: Option<String>,
}

/// Represents an email message received by the SMTP server
#[derive(Debug, Clone)]
pub struct Email {
    /// Author, from the From header or the envelope sender
    pub from: Option<Mailbox>,
    pub sender: Option<Mailbox>,
    pub reply_to: Vec<Mailbox>,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,

    /// Address given in MAIL FROM
    pub envelope_from: Option<String>,
    /// Addresses given in RCPT TO, in order
    pub envelope_to: Vec<String>,

    pub subject: Option<String>,
    pub body: Option<String>,
    pub is_html: bool,
    pub alternate_views: Vec<AlternateView>,
    pub attachments: Vec<Attachment>,
    pub headers: Vec<Header>,

    /// The message text as received, including the trace header
    pub raw: String,

    /// When the email was received by the server
    pub received_at: DateTime<Utc>,
}

impl Email {
    /// Check if this email was sent to a specific recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .any(|mailbox| mailbox.matches(recipient))
    }

    /// Check if this email was sent from a specific sender
    pub fn is_from_sender(&self, sender: &str) -> bool {
        self.from.as_ref().is_some_and(|from| from.matches(sender))
    }

    /// First value of a header, by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
            .map(|header| header.value.as_str())
    }

    /// The plain text body, from `body` or an alternate view
    pub fn text_body(&self) -> Option<&str> {
        if !self.is_html && self.body.is_some() {
            return self.body.as_deref();
        }
        self.view("text/plain")
    }

    /// The HTML body, from `body` or an alternate view
    pub fn html_body(&self) -> Option<&str> {
        if self.is_html && self.body.is_some() {
            return self.body.as_deref();
        }
        self.view("text/html")
    }

    fn view(&self, content_type: &str) -> Option<&str> {
        self.alternate_views
            .iter()
            .find(|view| view.content_type.eq_ignore_ascii_case(content_type))
            .map(|view| view.content.as_str())
    }

    /// Size of the received text in bytes
    pub fn data_size(&self) -> usize {
        self.raw.len()
    }

    /// Check if the email contains a specific text in headers or body
    pub fn contains_text(&self, text: &str) -> bool {
        self.raw.contains(text)
    }
}
