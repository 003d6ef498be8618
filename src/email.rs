//! Sending a single email over SMTP with STARTTLS.

mod connector;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use lettre::{
    address::{AddressError, Envelope},
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    Message,
};
use thiserror::Error;

use crate::logging::Logger;

pub use connector::{
    Connector, SmtpServer, StartTlsConnector, DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER,
};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed for one send. `bcc` addresses receive the message but never appear in its
/// headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,

    /// Defaults to the username used to authenticate
    pub from: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,

    /// Read at send time, unreadable files are skipped
    pub attachments: Vec<PathBuf>,
    pub is_html: bool,

    /// Override the sender's defaults for this send only
    pub username: Option<String>,
    pub password: Option<String>,
}

impl OutgoingEmail {
    pub fn new<S: Into<String>>(
        subject: impl Into<String>,
        body: impl Into<String>,
        to: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            to: to.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn from_address(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn cc<S: Into<String>>(mut self, cc: impl IntoIterator<Item = S>) -> Self {
        self.cc.extend(cc.into_iter().map(Into::into));
        self
    }

    pub fn bcc<S: Into<String>>(mut self, bcc: impl IntoIterator<Item = S>) -> Self {
        self.bcc.extend(bcc.into_iter().map(Into::into));
        self
    }

    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    pub fn html(mut self, is_html: bool) -> Self {
        self.is_html = is_html;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// What a successful send did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Size of the envelope (to + cc + bcc)
    pub recipients: usize,
    pub skipped_attachments: Vec<SkippedAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAttachment {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Email credentials not provided")]
    MissingCredentials,

    #[error("No \"to\" recipient given")]
    NoRecipients,

    #[error("Invalid email address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Error sending email: {0:#}")]
    Transport(anyhow::Error),
}

/// Sends emails through one SMTP server. Every send opens and closes its own session.
pub struct EmailSender<C = StartTlsConnector> {
    server: SmtpServer,
    username: Option<String>,
    password: Option<String>,
    logger: Logger,
    connector: C,
}

impl EmailSender {
    pub fn new(server: SmtpServer, logger: Logger) -> Self {
        Self::with_connector(server, logger, StartTlsConnector)
    }
}

impl<C: Connector> EmailSender<C> {
    pub fn with_connector(server: SmtpServer, logger: Logger, connector: C) -> Self {
        Self {
            server,
            username: None,
            password: None,
            logger,
            connector,
        }
    }

    /// Default credentials, used for any field a send does not override
    pub fn with_credentials(
        mut self,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        self.username = username;
        self.password = password;
        self
    }

    pub fn server(&self) -> &SmtpServer {
        &self.server
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Sends `email` as HTML or plain text depending on [`OutgoingEmail::is_html`]. The outcome is
    /// logged in either case.
    pub fn send_email(&self, email: &OutgoingEmail) -> Result<Delivery, SendError> {
        self.deliver(email, email.is_html)
    }

    /// Same as [`EmailSender::send_email`] with the body always sent as HTML
    pub fn send_html_email(&self, email: &OutgoingEmail) -> Result<Delivery, SendError> {
        self.deliver(email, true)
    }

    fn deliver(&self, email: &OutgoingEmail, is_html: bool) -> Result<Delivery, SendError> {
        let result = self.try_deliver(email, is_html);
        match &result {
            Ok(delivery) => self.logger.success(format_args!(
                "Email sent successfully to {} recipient(s)",
                delivery.recipients
            )),
            Err(e) => self.logger.error(e),
        }
        result
    }

    fn try_deliver(&self, email: &OutgoingEmail, is_html: bool) -> Result<Delivery, SendError> {
        let credentials = self
            .resolve_credentials(email)
            .ok_or(SendError::MissingCredentials)?;
        if email.to.is_empty() {
            return Err(SendError::NoRecipients);
        }
        let from = non_empty(&email.from).unwrap_or(credentials.username.as_str());

        let Composed {
            message,
            envelope,
            skipped_attachments,
        } = self.compose(email, from, is_html)?;

        self.logger.debug(format_args!(
            "Sending {:?} via {} to {} recipient(s)",
            email.subject,
            self.server,
            envelope.to().len()
        ));
        self.connector
            .send(&self.server, &credentials, &envelope, &message.formatted())
            .map_err(SendError::Transport)?;

        Ok(Delivery {
            recipients: envelope.to().len(),
            skipped_attachments,
        })
    }

    /// Call-time values win, each field is resolved on its own
    fn resolve_credentials(&self, email: &OutgoingEmail) -> Option<Credentials> {
        let username = non_empty(&email.username).or(non_empty(&self.username))?;
        let password = non_empty(&email.password).or(non_empty(&self.password))?;
        Some(Credentials::new(username, password))
    }

    fn compose(
        &self,
        email: &OutgoingEmail,
        from: &str,
        is_html: bool,
    ) -> Result<Composed, SendError> {
        let from = parse_mailbox(from)?;
        let to = parse_mailboxes(&email.to)?;
        let cc = parse_mailboxes(&email.cc)?;
        let bcc = parse_mailboxes(&email.bcc)?;

        let mut builder = Message::builder()
            .from(from.clone())
            .subject(email.subject.as_str());
        for mailbox in &to {
            builder = builder.to(mailbox.clone());
        }
        for mailbox in &cc {
            builder = builder.cc(mailbox.clone());
        }

        let body = if is_html {
            SinglePart::html(email.body.clone())
        } else {
            SinglePart::plain(email.body.clone())
        };
        let mut parts = MultiPart::mixed().singlepart(body);

        let mut skipped_attachments = Vec::new();
        for path in &email.attachments {
            match read_attachment(path) {
                Ok(part) => parts = parts.singlepart(part),
                Err(e) => {
                    self.logger
                        .error(format_args!("Error attaching file {path:?}: {e:#}"));
                    skipped_attachments.push(SkippedAttachment {
                        path: path.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        let message = builder.multipart(parts)?;
        let envelope = Envelope::new(
            Some(from.email),
            to.into_iter()
                .chain(cc)
                .chain(bcc)
                .map(|mailbox| mailbox.email)
                .collect(),
        )?;

        Ok(Composed {
            message,
            envelope,
            skipped_attachments,
        })
    }
}

struct Composed {
    message: Message,
    envelope: Envelope,
    skipped_attachments: Vec<SkippedAttachment>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address
        .parse()
        .map_err(|source| SendError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

fn parse_mailboxes(addresses: &[String]) -> Result<Vec<Mailbox>, SendError> {
    addresses.iter().map(|address| parse_mailbox(address)).collect()
}

fn read_attachment(path: &Path) -> anyhow::Result<SinglePart> {
    let filename = path
        .file_name()
        .with_context(|| format!("{path:?} does not name a file"))?
        .to_string_lossy()
        .into_owned();
    let content = fs::read(path).with_context(|| format!("Failed to read {path:?}"))?;
    let content_type = ContentType::parse("application/octet-stream")
        .context("Failed to build attachment content type")?;
    Ok(Attachment::new(filename).body(content, content_type))
}
