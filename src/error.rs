use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline step an [`Error`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    TemplateLoad,
    TemplateRender,
    Connect,
    ClientInit,
    Auth,
    Envelope,
    Data,
    Close,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::TemplateLoad => "template-load",
            Stage::TemplateRender => "template-render",
            Stage::Connect => "connect",
            Stage::ClientInit => "client-init",
            Stage::Auth => "auth",
            Stage::Envelope => "envelope",
            Stage::Data => "data",
            Stage::Close => "close",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can go wrong while sending a single mail.
///
/// The first error hit by any stage is returned as-is; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("[config] {0}")]
    Config(String),

    #[error("[template-load] failed to load {}: {reason}", path.display())]
    TemplateLoad { path: PathBuf, reason: String },

    #[error("[template-render] failed to render {}: {source}", path.display())]
    TemplateRender {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },

    #[error("[connect] {0}")]
    Connection(String),

    #[error("[client-init] {message}")]
    ClientInit { message: String, code: Option<u16> },

    #[error("[auth] {message}")]
    Auth { message: String, code: Option<u16> },

    #[error("[envelope] {message}")]
    Envelope { message: String, code: Option<u16> },

    #[error("[data] {message}")]
    DataTransfer { message: String, code: Option<u16> },

    #[error("[close] {message}")]
    Close { message: String, code: Option<u16> },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Build an SMTP-level error of the kind belonging to `stage`.
    ///
    /// Stages outside the SMTP session collapse into [`Error::Connection`].
    pub fn smtp(stage: Stage, message: impl Into<String>, code: Option<u16>) -> Self {
        let message = message.into();
        match stage {
            Stage::ClientInit => Self::ClientInit { message, code },
            Stage::Auth => Self::Auth { message, code },
            Stage::Envelope => Self::Envelope { message, code },
            Stage::Data => Self::DataTransfer { message, code },
            Stage::Close => Self::Close { message, code },
            _ => Self::Connection(message),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Error::Config(_) => Stage::Config,
            Error::TemplateLoad { .. } => Stage::TemplateLoad,
            Error::TemplateRender { .. } => Stage::TemplateRender,
            Error::Connection(_) => Stage::Connect,
            Error::ClientInit { .. } => Stage::ClientInit,
            Error::Auth { .. } => Stage::Auth,
            Error::Envelope { .. } => Stage::Envelope,
            Error::DataTransfer { .. } => Stage::Data,
            Error::Close { .. } => Stage::Close,
        }
    }

    /// SMTP reply code the server rejected the step with, if any.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Error::ClientInit { code, .. }
            | Error::Auth { code, .. }
            | Error::Envelope { code, .. }
            | Error::DataTransfer { code, .. }
            | Error::Close { code, .. } => *code,
            _ => None,
        }
    }
}
