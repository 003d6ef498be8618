use std::fmt::{self, Display};

use anyhow::Context;
use lettre::{
    address::Envelope,
    transport::smtp::authentication::Credentials as SmtpCredentials,
    SmtpTransport, Transport,
};

use super::Credentials;

pub const DEFAULT_SMTP_SERVER: &str = "mail.maceioti.com.br";

/// Submission port, upgraded with STARTTLS
pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpServer {
    pub host: String,
    pub port: u16,
}

impl SmtpServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for SmtpServer {
    fn default() -> Self {
        Self::new(DEFAULT_SMTP_SERVER, DEFAULT_SMTP_PORT)
    }
}

impl Display for SmtpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens a session, authenticates and transmits one already formatted message.
///
/// Implementations must not keep the session around after `send` returns.
pub trait Connector {
    fn send(
        &self,
        server: &SmtpServer,
        credentials: &Credentials,
        envelope: &Envelope,
        message: &[u8],
    ) -> anyhow::Result<()>;
}

/// EHLO, STARTTLS (default certificate validation), EHLO, AUTH, then MAIL/RCPT/DATA
#[derive(Debug, Default, Clone, Copy)]
pub struct StartTlsConnector;

impl Connector for StartTlsConnector {
    fn send(
        &self,
        server: &SmtpServer,
        credentials: &Credentials,
        envelope: &Envelope,
        message: &[u8],
    ) -> anyhow::Result<()> {
        // Built per call, dropping it closes the connection
        let transport = SmtpTransport::starttls_relay(&server.host)
            .with_context(|| format!("Failed to set up STARTTLS for {server}"))?
            .port(server.port)
            .credentials(SmtpCredentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ))
            .build();
        transport
            .send_raw(envelope, message)
            .with_context(|| format!("SMTP transaction with {server} failed"))?;
        Ok(())
    }
}
