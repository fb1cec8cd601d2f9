//! In-memory SMTP relay used to drive the client in tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::config::ServerConfig;
use crate::error::{Error, Result};

use super::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Greeted,
    LoginUser,
    LoginPassword,
    ReceivingData,
}

/// Scripted relay. Every connection gets its own session; the command log
/// and received data are shared so tests can inspect them afterwards.
#[derive(Debug, Clone)]
pub struct Relay {
    pub greeting: &'static str,
    pub mechanisms: &'static str,
    /// Extra EHLO keywords, one per line.
    pub extensions: &'static [&'static str],
    pub reject_auth: bool,
    pub reject_rcpt: bool,
    pub reject_message: bool,
    /// Never send the greeting, to exercise client deadlines.
    pub silent: bool,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub data: Arc<Mutex<String>>,
    pub connections: Arc<Mutex<usize>>,
}

impl Relay {
    pub const OK: &'static str = "250 Ok\r\n";
    pub const AUTH_OK: &'static str = "235 2.7.0 Accepted\r\n";
    pub const AUTH_FAILED: &'static str = "535 5.7.8 Username and Password not accepted\r\n";
    pub const SEND_DATA: &'static str = "354 End data with <CR><LF>.<CR><LF>\r\n";
    pub const END: &'static str = "221 Bye\r\n";

    pub fn new() -> Self {
        Self {
            greeting: "220 relay.test ESMTP ready\r\n",
            mechanisms: "LOGIN PLAIN",
            extensions: &[],
            reject_auth: false,
            reject_rcpt: false,
            reject_message: false,
            silent: false,
            commands: Arc::default(),
            data: Arc::default(),
            connections: Arc::default(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn verbs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| c.split([' ', ':']).next().unwrap_or("").to_string())
            .collect()
    }

    pub fn data(&self) -> String {
        self.data.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }

    /// Open a client stream with a relay session running on the other end.
    pub fn open(&self) -> DuplexStream {
        *self.connections.lock().unwrap() += 1;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let relay = self.clone();
        tokio::spawn(async move {
            if let Err(e) = relay.serve(server).await {
                tracing::debug!("Relay session ended: {}", e);
            }
        });
        client
    }

    async fn serve(self, stream: DuplexStream) -> std::io::Result<()> {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        if self.silent {
            // hold the connection open without talking
            while lines.next_line().await?.is_some() {}
            return Ok(());
        }
        write.write_all(self.greeting.as_bytes()).await?;

        let mut state = State::Fresh;
        while let Some(line) = lines.next_line().await? {
            if state == State::ReceivingData {
                if line == "." {
                    state = State::Greeted;
                    let reply = if self.reject_message {
                        "554 5.6.0 Message rejected\r\n"
                    } else {
                        Self::OK
                    };
                    write.write_all(reply.as_bytes()).await?;
                } else {
                    let line = line.strip_prefix('.').unwrap_or(&line);
                    let mut data = self.data.lock().unwrap();
                    data.push_str(line);
                    data.push_str("\r\n");
                }
                continue;
            }

            self.commands.lock().unwrap().push(line.clone());
            let command = line
                .split([' ', ':'])
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();

            let reply: String = match (command.as_str(), state) {
                (_, State::LoginUser) => {
                    state = State::LoginPassword;
                    "334 UGFzc3dvcmQ6\r\n".to_string()
                }
                (_, State::LoginPassword) => {
                    state = State::Greeted;
                    self.auth_reply().to_string()
                }
                ("ehlo", State::Fresh) => {
                    state = State::Greeted;
                    self.ehlo_reply()
                }
                ("auth", State::Greeted) if line.to_ascii_uppercase().starts_with("AUTH LOGIN") => {
                    state = State::LoginUser;
                    "334 VXNlcm5hbWU6\r\n".to_string()
                }
                ("auth", State::Greeted) => self.auth_reply().to_string(),
                ("mail", State::Greeted) => Self::OK.to_string(),
                ("rcpt", State::Greeted) if self.reject_rcpt => {
                    "550 5.1.1 No such user\r\n".to_string()
                }
                ("rcpt", State::Greeted) => Self::OK.to_string(),
                ("data", State::Greeted) => {
                    state = State::ReceivingData;
                    Self::SEND_DATA.to_string()
                }
                ("quit", _) => {
                    write.write_all(Self::END.as_bytes()).await?;
                    return Ok(());
                }
                _ => "503 5.5.1 Bad sequence of commands\r\n".to_string(),
            };
            write.write_all(reply.as_bytes()).await?;
        }
        Ok(())
    }

    fn ehlo_reply(&self) -> String {
        let mut lines = vec!["relay.test".to_string()];
        lines.extend(self.extensions.iter().map(|e| e.to_string()));
        if !self.mechanisms.is_empty() {
            lines.push(format!("AUTH {}", self.mechanisms));
        }

        let last = lines.len() - 1;
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let sep = if i == last { ' ' } else { '-' };
                format!("250{}{}\r\n", sep, line)
            })
            .collect()
    }

    fn auth_reply(&self) -> &'static str {
        if self.reject_auth {
            Self::AUTH_FAILED
        } else {
            Self::AUTH_OK
        }
    }
}

#[async_trait]
impl Connector for Relay {
    type Stream = DuplexStream;

    async fn connect(&self, _server: &ServerConfig) -> Result<DuplexStream> {
        Ok(self.open())
    }
}

/// Connector whose dial never completes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _server: &ServerConfig) -> Result<DuplexStream> {
        std::future::pending().await
    }
}

/// Connector whose dial always fails, counting the attempts.
#[derive(Debug, Default, Clone)]
pub struct RefusingConnector {
    pub attempts: Arc<Mutex<usize>>,
}

#[async_trait]
impl Connector for RefusingConnector {
    type Stream = DuplexStream;

    async fn connect(&self, server: &ServerConfig) -> Result<DuplexStream> {
        *self.attempts.lock().unwrap() += 1;
        Err(Error::connection(format!(
            "failed to connect to {}: connection refused",
            server.address()
        )))
    }
}
