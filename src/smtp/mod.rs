//! SMTP server implementation

pub mod assembler;
pub mod commands;
pub mod config;
pub mod email;
pub mod error;
pub mod protocol;
pub mod response;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;

pub use assembler::RawMessage;
pub use config::ServerConfig;
pub use email::{AlternateView, Attachment, Email, Header, Mailbox};
pub use error::SmtpError;
pub use response::SmtpResponse;
pub use server::SmtpServer;
pub use session::{SmtpSession, SmtpState};
pub use store::MessageStore;
pub use transport::{Connection, SmtpTransport};
