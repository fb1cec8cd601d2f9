pub mod config;
pub mod error;
pub mod mailer;
pub mod message;
pub mod smtp;
pub mod template;

pub use config::{Credentials, MailConfig, ServerConfig};
pub use error::{Error, Result, Stage};
pub use mailer::{Mailer, MessageKind};

/// A single outgoing mail, built per send request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}
