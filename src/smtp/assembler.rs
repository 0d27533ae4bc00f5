//! Raw message accumulation and conversion into [`Email`]

use chrono::Utc;
use mailparse::{DispositionType, MailAddr, MailHeader, MailHeaderMap, ParsedMail};
use tracing::warn;

use crate::smtp::email::{AlternateView, Attachment, Email, Header, Mailbox};
use crate::smtp::error::SmtpError;

/// The literal octets of a message being received, plus its envelope
#[derive(Debug, Default, Clone)]
pub struct RawMessage {
    data: Vec<u8>,
    sender: Option<String>,
    recipients: Vec<String>,
}

impl RawMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sender(&mut self, address: String) {
        self.sender = Some(address);
    }

    pub fn add_recipient(&mut self, address: String) {
        self.recipients.push(address);
    }

    /// Append one line, re-inserting the CRLF stripped by the transport
    pub fn append_line(&mut self, line: impl AsRef<[u8]>) {
        self.data.extend_from_slice(line.as_ref());
        self.data.extend_from_slice(b"\r\n");
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Parse the captured text into a structured message.
    ///
    /// Envelope data fills what the headers leave out: the envelope sender
    /// stands in for a missing From header, and envelope recipients named in
    /// none of To, Cc or Bcc (typically blind copies) are added to `to`.
    pub fn into_email(self) -> Result<Email, SmtpError> {
        let parsed = Parsed::from_bytes(&self.data)?;

        let mut from = parsed.from;
        if from.is_none() {
            from = self.sender.clone().map(|address| Mailbox::new(None, address));
        }

        let mut to = parsed.to;
        for recipient in &self.recipients {
            let known = to
                .iter()
                .chain(&parsed.cc)
                .chain(&parsed.bcc)
                .any(|mailbox| mailbox.matches(recipient));
            if !known {
                to.push(Mailbox::new(None, recipient.clone()));
            }
        }

        Ok(Email {
            from,
            sender: parsed.sender,
            reply_to: parsed.reply_to,
            to,
            cc: parsed.cc,
            bcc: parsed.bcc,
            envelope_from: self.sender,
            envelope_to: self.recipients,
            subject: parsed.subject,
            body: parsed.content.body,
            is_html: parsed.content.is_html,
            alternate_views: parsed.content.alternate_views,
            attachments: parsed.content.attachments,
            headers: parsed.headers,
            raw: String::from_utf8_lossy(&self.data).into_owned(),
            received_at: Utc::now(),
        })
    }
}

/// Everything extracted from the MIME document, owned so the raw text can
/// move into the resulting [`Email`].
struct Parsed {
    headers: Vec<Header>,
    subject: Option<String>,
    from: Option<Mailbox>,
    sender: Option<Mailbox>,
    reply_to: Vec<Mailbox>,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    content: Content,
}

impl Parsed {
    fn from_bytes(data: &[u8]) -> Result<Self, SmtpError> {
        let mail = mailparse::parse_mail(data)?;

        let mut content = Content::default();
        content.collect(&mail)?;

        Ok(Self {
            headers: copy_headers(&mail.headers),
            subject: mail.headers.get_first_value("Subject"),
            from: mailboxes(&mail.headers, "From").into_iter().next(),
            sender: mailboxes(&mail.headers, "Sender").into_iter().next(),
            reply_to: mailboxes(&mail.headers, "Reply-To"),
            to: mailboxes(&mail.headers, "To"),
            cc: mailboxes(&mail.headers, "Cc"),
            bcc: mailboxes(&mail.headers, "Bcc"),
            content,
        })
    }
}

/// Shape of one MIME entity, as far as body/attachment selection cares
pub(crate) enum MimeNode<'p, 'a> {
    Leaf(&'p ParsedMail<'a>),
    Alternative(&'p [ParsedMail<'a>]),
    Multipart(&'p [ParsedMail<'a>]),
}

impl<'p, 'a> MimeNode<'p, 'a> {
    pub(crate) fn classify(part: &'p ParsedMail<'a>) -> Self {
        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        if part.subparts.is_empty() || !mimetype.starts_with("multipart/") {
            MimeNode::Leaf(part)
        } else if mimetype == "multipart/alternative" {
            MimeNode::Alternative(&part.subparts)
        } else {
            MimeNode::Multipart(&part.subparts)
        }
    }
}

#[derive(Default)]
struct Content {
    body: Option<String>,
    is_html: bool,
    alternate_views: Vec<AlternateView>,
    attachments: Vec<Attachment>,
}

impl Content {
    fn collect(&mut self, part: &ParsedMail<'_>) -> Result<(), SmtpError> {
        match MimeNode::classify(part) {
            MimeNode::Alternative(children) => {
                for child in children {
                    self.alternate_views.push(AlternateView {
                        content_type: child.ctype.mimetype.to_ascii_lowercase(),
                        charset: child.ctype.charset.clone(),
                        content: strip_line_end(child.get_body()?),
                        transfer_encoding: transfer_encoding(child),
                        content_id: content_id(child),
                    });
                }
            }
            MimeNode::Multipart(children) => {
                for child in children {
                    self.collect(child)?;
                }
            }
            MimeNode::Leaf(leaf) => self.leaf(leaf)?,
        }
        Ok(())
    }

    fn leaf(&mut self, part: &ParsedMail<'_>) -> Result<(), SmtpError> {
        let disposition = part.get_content_disposition();
        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        let is_attachment = matches!(disposition.disposition, DispositionType::Attachment);

        if is_attachment || self.body.is_some() || !mimetype.starts_with("text/") {
            let name = disposition
                .params
                .get("filename")
                .or_else(|| part.ctype.params.get("name"))
                .cloned();
            let transfer_encoding = transfer_encoding(part);
            let mut content = part.get_body_raw()?;
            if transfer_encoding != "base64" && content.ends_with(b"\r\n") {
                content.truncate(content.len() - 2);
            }
            self.attachments.push(Attachment {
                name,
                content,
                content_type: mimetype,
                transfer_encoding,
                content_id: content_id(part),
                disposition_params: disposition.params,
            });
        } else {
            self.is_html = mimetype == "text/html";
            self.body = Some(strip_line_end(part.get_body()?));
        }
        Ok(())
    }
}

fn copy_headers(headers: &[MailHeader<'_>]) -> Vec<Header> {
    headers
        .iter()
        .filter_map(|header| {
            let value = String::from_utf8_lossy(header.get_value_raw())
                .trim()
                .to_string();
            (!value.is_empty()).then(|| Header {
                name: header.get_key(),
                value,
            })
        })
        .collect()
}

/// Every mailbox named in the headers called `name`.
///
/// A value mailparse rejects (`To: root`, a bare display name) is split on
/// commas and each entry kept as it is written, so one sloppy header never
/// costs the whole message.
fn mailboxes(headers: &[MailHeader<'_>], name: &str) -> Vec<Mailbox> {
    let mut result = Vec::new();
    for header in headers.get_all_headers(name) {
        match mailparse::addrparse_header(header) {
            Ok(list) => push_addrs(&mut result, &list),
            Err(e) => {
                warn!(header = name, error = %e, "unparseable address header, keeping raw entries");
                for entry in header.get_value().split(',').map(str::trim) {
                    if entry.is_empty() {
                        continue;
                    }
                    match mailparse::addrparse(entry) {
                        Ok(list) => push_addrs(&mut result, &list),
                        Err(_) => result.push(Mailbox::new(None, entry)),
                    }
                }
            }
        }
    }
    result
}

fn push_addrs(result: &mut Vec<Mailbox>, addrs: &[MailAddr]) {
    for addr in addrs {
        match addr {
            MailAddr::Single(info) => {
                result.push(Mailbox::new(info.display_name.clone(), info.addr.clone()));
            }
            MailAddr::Group(group) => {
                result.extend(
                    group
                        .addrs
                        .iter()
                        .map(|info| Mailbox::new(info.display_name.clone(), info.addr.clone())),
                );
            }
        }
    }
}

fn transfer_encoding(part: &ParsedMail<'_>) -> String {
    part.headers
        .get_first_value("Content-Transfer-Encoding")
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "7bit".to_string())
}

fn content_id(part: &ParsedMail<'_>) -> Option<String> {
    part.headers.get_first_value("Content-ID").map(|value| {
        value
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string()
    })
}

/// The CRLF ending the last line belongs to the data terminator
fn strip_line_end(mut text: String) -> String {
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') {
        text.pop();
    }
    text
}
