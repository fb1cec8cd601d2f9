use crate::config::{MailConfig, ServerConfig};
use crate::error::Result;
use crate::message;
use crate::smtp::{Envelope, SmtpTransport, Transport};
use crate::template::{self, TemplateData};
use crate::Mail;

pub const PASSWORD_RESET_SUBJECT: &str = "New Password";

/// The notifications this crate knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Confirmation,
    PasswordReset,
    BidAlert,
}

impl MessageKind {
    pub fn template_file(self) -> &'static str {
        match self {
            MessageKind::Confirmation => "confirmation_template.html",
            MessageKind::PasswordReset => "passwordChange_template.html",
            MessageKind::BidAlert => "bid-alert_template.html",
        }
    }

    /// Fields the kind's template is rendered with.
    pub fn fields(self) -> [&'static str; 2] {
        match self {
            MessageKind::Confirmation | MessageKind::BidAlert => ["name", "url"],
            MessageKind::PasswordReset => ["password", "url"],
        }
    }
}

/// Renders, composes and delivers transactional mail.
///
/// Each send is independent: nothing is cached, queued or retried, and the
/// first error from any stage is returned unchanged.
pub struct Mailer<T = SmtpTransport> {
    config: MailConfig,
    transport: T,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Self {
        Self::with_transport(config, SmtpTransport::new())
    }
}

impl<T: Transport> Mailer<T> {
    pub fn with_transport(config: MailConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn subject(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Confirmation => &self.config.confirmation_subject,
            MessageKind::PasswordReset => PASSWORD_RESET_SUBJECT,
            MessageKind::BidAlert => &self.config.bid_alert_subject,
        }
    }

    pub fn server(&self, kind: MessageKind) -> ServerConfig {
        match kind {
            MessageKind::PasswordReset => self.config.password_reset_server(),
            _ => self.config.server.clone(),
        }
    }

    /// Email new users a link to confirm their account.
    pub async fn send_confirmation(&self, to: &str, name: &str, url: &str) -> Result<()> {
        self.send(MessageKind::Confirmation, to, [name, url]).await
    }

    /// Email a user their new password.
    pub async fn send_password_reset(&self, to: &str, password: &str, url: &str) -> Result<()> {
        self.send(MessageKind::PasswordReset, to, [password, url])
            .await
    }

    /// Email a bidder about activity on an auction.
    pub async fn send_bid_alert(&self, to: &str, name: &str, url: &str) -> Result<()> {
        self.send(MessageKind::BidAlert, to, [name, url]).await
    }

    /// Render the kind's template for `to`.
    pub fn build(&self, kind: MessageKind, to: &str, data: &TemplateData) -> Result<Mail> {
        let mut mail = Mail {
            to: to.to_string(),
            subject: self.subject(kind).to_string(),
            ..Default::default()
        };
        let path = self.config.template_dir.join(kind.template_file());
        mail.body = template::render(&path, data)?;
        Ok(mail)
    }

    /// The exact message that would be handed to the server, without sending it.
    pub fn compose(&self, kind: MessageKind, to: &str, data: &TemplateData) -> Result<String> {
        let mail = self.build(kind, to, data)?;
        Ok(message::compose(self.config.sender(), &mail.subject, &mail.body))
    }

    async fn send(&self, kind: MessageKind, to: &str, values: [&str; 2]) -> Result<()> {
        let data: TemplateData = kind
            .fields()
            .iter()
            .zip(values)
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect();

        let message = self.compose(kind, to, &data)?;
        let envelope = Envelope::new(self.config.sender(), to);

        tracing::debug!("Sending {:?} mail to {}", kind, to);
        self.transport
            .send(
                &self.server(kind),
                &self.config.credentials,
                &envelope,
                &message,
            )
            .await
    }
}
