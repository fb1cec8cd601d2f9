use std::time::Duration;

use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::config::Credentials;
use crate::error::{Error, Result, Stage};

use super::reply::Reply;

/// Progress of a single SMTP transaction.
///
/// States only ever move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    TlsConnected,
    ClientReady,
    Authenticated,
    MailFromSet,
    RcptToSet,
    DataOpen,
    DataSent,
    Closed,
}

impl State {
    pub fn next(self) -> Option<State> {
        match self {
            State::Init => Some(State::TlsConnected),
            State::TlsConnected => Some(State::ClientReady),
            State::ClientReady => Some(State::Authenticated),
            State::Authenticated => Some(State::MailFromSet),
            State::MailFromSet => Some(State::RcptToSet),
            State::RcptToSet => Some(State::DataOpen),
            State::DataOpen => Some(State::DataSent),
            State::DataSent => Some(State::Closed),
            State::Closed => None,
        }
    }
}

/// Client side of one SMTP session over an already established stream.
///
/// # Usage
///
/// Call `greet`, `authenticate`, `mail_from`, `rcpt_to`, `open_data`,
/// `write_message` and `finish` in that order. On failure call `abort` to
/// release the connection.
pub struct Session<S> {
    stream: BufReader<S>,
    state: State,
    client_name: String,
    command_timeout: Duration,
    auth_mechanisms: Vec<String>,
    extensions: Vec<String>,
    /// Set once the end-of-data reply is read and the server takes commands again.
    data_done: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const CLIENT_NAME: &'static str = "localhost";

    /// Wrap a freshly connected stream. The session starts in `TlsConnected`.
    pub fn new(stream: S, command_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            state: State::TlsConnected,
            client_name: Self::CLIENT_NAME.to_string(),
            command_timeout,
            auth_mechanisms: Vec::new(),
            extensions: Vec::new(),
            data_done: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Read the server greeting and introduce ourselves.
    pub async fn greet(&mut self) -> Result<()> {
        let stage = Stage::ClientInit;
        self.expect_next(State::ClientReady, stage)?;

        let greeting = self.read_reply(stage).await?;
        if greeting.code != 220 {
            return Err(rejected(stage, "greeting", &greeting));
        }

        let ehlo = format!("EHLO {}", self.client_name);
        let reply = self.command(&ehlo, stage).await?;
        if reply.is_positive() {
            self.auth_mechanisms = reply.auth_mechanisms();
            self.extensions = reply.extensions();
        } else {
            tracing::debug!("EHLO rejected with {}, falling back to HELO", reply.code);
            let helo = format!("HELO {}", self.client_name);
            let reply = self.command(&helo, stage).await?;
            if !reply.is_positive() {
                return Err(rejected(stage, "HELO", &reply));
            }
        }

        self.advance(State::ClientReady);
        Ok(())
    }

    /// Log in with `PLAIN`, or `LOGIN` when that is all the server offers.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let stage = Stage::Auth;
        self.expect_next(State::Authenticated, stage)?;

        let plain = self.auth_mechanisms.iter().any(|m| m == "PLAIN");
        let login = self.auth_mechanisms.iter().any(|m| m == "LOGIN");
        if plain {
            self.auth_plain(credentials).await?;
        } else if login {
            self.auth_login(credentials).await?;
        } else if self.auth_mechanisms.is_empty() {
            return Err(Error::smtp(stage, "server does not support AUTH", None));
        } else {
            return Err(Error::smtp(
                stage,
                format!(
                    "no supported AUTH mechanism in {}",
                    self.auth_mechanisms.join(" ")
                ),
                None,
            ));
        }

        self.advance(State::Authenticated);
        Ok(())
    }

    pub async fn mail_from(&mut self, sender: &str) -> Result<()> {
        let stage = Stage::Envelope;
        self.expect_next(State::MailFromSet, stage)?;
        single_line(sender, stage)?;

        let mut cmd = format!("MAIL FROM:<{}>", sender);
        if self.extensions.iter().any(|e| e == "8BITMIME") {
            cmd.push_str(" BODY=8BITMIME");
        }
        let reply = self.command(&cmd, stage).await?;
        if !reply.is_positive() {
            return Err(rejected(stage, "MAIL FROM", &reply));
        }

        self.advance(State::MailFromSet);
        Ok(())
    }

    pub async fn rcpt_to(&mut self, recipient: &str) -> Result<()> {
        let stage = Stage::Envelope;
        self.expect_next(State::RcptToSet, stage)?;
        single_line(recipient, stage)?;

        let reply = self
            .command(&format!("RCPT TO:<{}>", recipient), stage)
            .await?;
        if !reply.is_positive() {
            return Err(rejected(stage, "RCPT TO", &reply));
        }

        self.advance(State::RcptToSet);
        Ok(())
    }

    pub async fn open_data(&mut self) -> Result<()> {
        let stage = Stage::Data;
        self.expect_next(State::DataOpen, stage)?;

        let reply = self.command("DATA", stage).await?;
        if reply.code != 354 {
            return Err(rejected(stage, "DATA", &reply));
        }

        self.advance(State::DataOpen);
        Ok(())
    }

    /// Write the message body, dot-stuffed with CRLF line endings.
    pub async fn write_message(&mut self, message: &str) -> Result<()> {
        let stage = Stage::Data;
        self.expect_next(State::DataSent, stage)?;

        let body = dot_stuff(message);
        self.write(body.as_bytes(), stage).await?;

        self.advance(State::DataSent);
        Ok(())
    }

    /// Terminate the data and end the session with `QUIT`.
    pub async fn finish(&mut self) -> Result<()> {
        let stage = Stage::Close;
        self.expect_next(State::Closed, stage)?;

        self.write(b".\r\n", stage).await?;
        let reply = self.read_reply(stage).await?;
        self.data_done = true;
        if !reply.is_positive() {
            return Err(rejected(stage, "message", &reply));
        }
        tracing::debug!("Message accepted: {}", reply);

        // the message is accepted at this point, a failed QUIT does not undo that
        match self.command("QUIT", stage).await {
            Ok(reply) if reply.code == 221 => {}
            Ok(reply) => tracing::warn!("Unexpected reply to QUIT: {}", reply),
            Err(e) => tracing::warn!("QUIT failed: {}", e),
        }
        self.close().await;
        Ok(())
    }

    /// Best-effort teardown after a failed step.
    ///
    /// Sends `QUIT` when the server is in command mode, then shuts the
    /// stream down. Errors are logged and swallowed.
    pub async fn abort(&mut self) {
        if self.state == State::Closed {
            return;
        }
        let reading_data = matches!(self.state, State::DataOpen | State::DataSent);
        if !reading_data || self.data_done {
            if let Err(e) = self.command("QUIT", Stage::Close).await {
                tracing::debug!("QUIT during abort failed: {}", e);
            }
        }
        self.close().await;
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.get_mut().shutdown().await {
            tracing::debug!("Shutdown failed: {}", e);
        }
        self.advance(State::Closed);
    }

    async fn auth_plain(&mut self, credentials: &Credentials) -> Result<()> {
        let payload = format!("\0{}\0{}", credentials.username, credentials.secret);
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());

        let reply = self
            .command(&format!("AUTH PLAIN {}", encoded), Stage::Auth)
            .await?;
        if reply.code != 235 {
            return Err(rejected(Stage::Auth, "AUTH PLAIN", &reply));
        }
        Ok(())
    }

    async fn auth_login(&mut self, credentials: &Credentials) -> Result<()> {
        let engine = base64::engine::general_purpose::STANDARD;

        let reply = self.command("AUTH LOGIN", Stage::Auth).await?;
        if reply.code != 334 {
            return Err(rejected(Stage::Auth, "AUTH LOGIN", &reply));
        }
        let reply = self
            .command(&engine.encode(credentials.username.as_bytes()), Stage::Auth)
            .await?;
        if reply.code != 334 {
            return Err(rejected(Stage::Auth, "AUTH LOGIN username", &reply));
        }
        let reply = self
            .command(&engine.encode(credentials.secret.as_bytes()), Stage::Auth)
            .await?;
        if reply.code != 235 {
            return Err(rejected(Stage::Auth, "AUTH LOGIN password", &reply));
        }
        Ok(())
    }

    /// Send a single command line and wait for the reply.
    async fn command(&mut self, cmd: &str, stage: Stage) -> Result<Reply> {
        if stage == Stage::Auth {
            tracing::trace!("C: <auth exchange>");
        } else {
            tracing::trace!("C: {}", cmd);
        }
        self.write(format!("{}\r\n", cmd).as_bytes(), stage).await?;
        self.read_reply(stage).await
    }

    async fn write(&mut self, bytes: &[u8], stage: Stage) -> Result<()> {
        let stream = self.stream.get_mut();
        let io = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        tokio::time::timeout(self.command_timeout, io)
            .await
            .map_err(|_| Error::smtp(stage, "timed out writing to server", None))?
            .map_err(|e| Error::smtp(stage, format!("write failed: {}", e), None))
    }

    async fn read_reply(&mut self, stage: Stage) -> Result<Reply> {
        let stream = &mut self.stream;
        let io = async {
            let mut raw = String::new();
            loop {
                let mut line = String::new();
                if stream.read_line(&mut line).await? == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed by server",
                    ));
                }
                tracing::trace!("S: {}", line.trim_end());
                let last = Reply::is_last_line(&line);
                raw.push_str(&line);
                if last {
                    return Ok::<_, std::io::Error>(raw);
                }
            }
        };

        let raw = tokio::time::timeout(self.command_timeout, io)
            .await
            .map_err(|_| Error::smtp(stage, "timed out waiting for server reply", None))?
            .map_err(|e| Error::smtp(stage, format!("read failed: {}", e), None))?;

        Reply::parse(&raw).map_err(|e| Error::smtp(stage, e, None))
    }

    fn expect_next(&self, to: State, stage: Stage) -> Result<()> {
        if self.state.next() == Some(to) {
            Ok(())
        } else {
            Err(Error::smtp(
                stage,
                format!("cannot move from {:?} to {:?}", self.state, to),
                None,
            ))
        }
    }

    fn advance(&mut self, to: State) {
        tracing::debug!("SMTP {:?} -> {:?}", self.state, to);
        self.state = to;
    }
}

/// Envelope arguments end up on a command line and must not split it.
fn single_line(value: &str, stage: Stage) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::smtp(
            stage,
            format!("line must not contain CR or LF: {:?}", value),
            None,
        ));
    }
    Ok(())
}

fn rejected(stage: Stage, what: &str, reply: &Reply) -> Error {
    Error::smtp(
        stage,
        format!("{} rejected: {}", what, reply),
        Some(reply.code),
    )
}

/// Normalize line endings to CRLF and escape lines starting with a dot.
///
/// The result always ends in CRLF so the `.` terminator sits on its own line.
pub fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 64);
    let body = message.strip_suffix('\n').unwrap_or(message);
    let body = body.strip_suffix('\r').unwrap_or(body);

    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}
