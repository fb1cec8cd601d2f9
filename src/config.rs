use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_PORT: u16 = 465;
pub const DEFAULT_CONFIRMATION_SUBJECT: &str = "Confirm your account";
pub const DEFAULT_BID_ALERT_SUBJECT: &str = "New bid alert";

/// Where and how to reach the SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Skip certificate chain validation. The server name is still sent.
    pub allow_insecure_tls: bool,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            allow_insecure_tls: false,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// SMTP login. The username is also the envelope sender.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything the mailer needs, resolved once at construction time.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub credentials: Credentials,
    pub confirmation_subject: String,
    pub bid_alert_subject: String,
    pub server: ServerConfig,
    /// Port override for password-reset mail only. `None` means `server.port`.
    pub password_reset_port: Option<u16>,
    pub template_dir: PathBuf,
}

impl MailConfig {
    pub fn new(sender: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(sender, secret),
            confirmation_subject: DEFAULT_CONFIRMATION_SUBJECT.to_string(),
            bid_alert_subject: DEFAULT_BID_ALERT_SUBJECT.to_string(),
            server: ServerConfig::default(),
            password_reset_port: None,
            template_dir: PathBuf::from("."),
        }
    }

    pub fn sender(&self) -> &str {
        &self.credentials.username
    }

    /// Read the configuration from the process environment.
    ///
    /// `EMAIL` and `EMAIL-PASSWORD` are required. Unset subjects fall back to
    /// built-in defaults with a warning.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::config(format!("{} is not set", key)))
        };

        let mut config = Self::new(required("EMAIL")?, required("EMAIL-PASSWORD")?);

        match lookup("CONFIRMATION-MAIL-SUBJECT").filter(|v| !v.is_empty()) {
            Some(subject) => config.confirmation_subject = subject,
            None => tracing::warn!(
                "CONFIRMATION-MAIL-SUBJECT not set, using default subject {:?}",
                DEFAULT_CONFIRMATION_SUBJECT
            ),
        }
        match lookup("BID-ALERT-SUBJECT").filter(|v| !v.is_empty()) {
            Some(subject) => config.bid_alert_subject = subject,
            None => tracing::warn!(
                "BID-ALERT-SUBJECT not set, using default subject {:?}",
                DEFAULT_BID_ALERT_SUBJECT
            ),
        }

        if let Some(host) = lookup("SMTP-HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("SMTP-PORT") {
            config.server.port = parse(&port, "SMTP-PORT")?;
        }
        if let Some(port) = lookup("PASSWORD-RESET-PORT") {
            config.password_reset_port = Some(parse(&port, "PASSWORD-RESET-PORT")?);
        }
        if let Some(flag) = lookup("SMTP-ALLOW-INSECURE-TLS") {
            config.server.allow_insecure_tls = parse(&flag, "SMTP-ALLOW-INSECURE-TLS")?;
        }
        if let Some(secs) = lookup("SMTP-CONNECT-TIMEOUT-SECS") {
            config.server.connect_timeout =
                Duration::from_secs(parse(&secs, "SMTP-CONNECT-TIMEOUT-SECS")?);
        }
        if let Some(secs) = lookup("SMTP-COMMAND-TIMEOUT-SECS") {
            config.server.command_timeout =
                Duration::from_secs(parse(&secs, "SMTP-COMMAND-TIMEOUT-SECS")?);
        }
        if let Some(dir) = lookup("MAIL-TEMPLATE-DIR") {
            config.template_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Relay used for password-reset mail.
    pub fn password_reset_server(&self) -> ServerConfig {
        match self.password_reset_port {
            Some(port) if port != self.server.port => {
                tracing::warn!(
                    "Password reset mail uses port {} instead of {}",
                    port,
                    self.server.port
                );
                ServerConfig {
                    port,
                    ..self.server.clone()
                }
            }
            _ => self.server.clone(),
        }
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {}: {:?}", key, value)))
}
