pub mod reply;
#[cfg(test)]
pub(crate) mod relay;
pub mod state_machine;
pub mod tls;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{Credentials, ServerConfig};
use crate::error::{Error, Result};

use self::state_machine::Session;
pub use self::tls::SmtpsConnector;

/// Envelope sender and recipient of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
}

impl Envelope {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Opens the byte stream an SMTP session runs over.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, server: &ServerConfig) -> Result<Self::Stream>;
}

/// Delivers one composed message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        server: &ServerConfig,
        credentials: &Credentials,
        envelope: &Envelope,
        message: &str,
    ) -> Result<()>;
}

/// SMTP delivery: one connection per message, no retries.
#[derive(Debug, Default, Clone)]
pub struct SmtpTransport<C = SmtpsConnector> {
    connector: C,
}

impl SmtpTransport {
    pub fn new() -> Self {
        Self::with_connector(SmtpsConnector)
    }
}

impl<C: Connector> SmtpTransport<C> {
    pub fn with_connector(connector: C) -> Self {
        Self { connector }
    }

    async fn transaction(
        session: &mut Session<C::Stream>,
        credentials: &Credentials,
        envelope: &Envelope,
        message: &str,
    ) -> Result<()> {
        session.greet().await?;
        session.authenticate(credentials).await?;
        session.mail_from(&envelope.from).await?;
        session.rcpt_to(&envelope.to).await?;
        session.open_data().await?;
        session.write_message(message).await?;
        session.finish().await
    }
}

#[async_trait]
impl<C: Connector> Transport for SmtpTransport<C> {
    async fn send(
        &self,
        server: &ServerConfig,
        credentials: &Credentials,
        envelope: &Envelope,
        message: &str,
    ) -> Result<()> {
        tracing::debug!("Connecting to {}", server.address());
        let stream = tokio::time::timeout(server.connect_timeout, self.connector.connect(server))
            .await
            .map_err(|_| {
                Error::connection(format!("timed out connecting to {}", server.address()))
            })??;

        let mut session = Session::new(stream, server.command_timeout);
        match Self::transaction(&mut session, credentials, envelope, message).await {
            Ok(()) => {
                tracing::info!("Delivered mail to {} via {}", envelope.to, server.host);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Delivery to {} failed in state {:?}: {}",
                    envelope.to,
                    session.state(),
                    e
                );
                session.abort().await;
                Err(e)
            }
        }
    }
}
