use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{email::OutgoingEmail, logging::Level};

#[derive(Parser, Clone, Eq, PartialEq, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Send emails over SMTP with STARTTLS, with optional HTML bodies and attachments."
)]
pub struct Cli {
    /// Specify config file to use
    ///
    /// If not specified uses `config.json` in the current folder
    #[arg(long = "config", short, value_name = "PATH")]
    pub config_filename: Option<String>,

    /// Overrides the logging level from the config file
    #[arg(long, short, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Only log to the console
    #[arg(long)]
    pub no_log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn get_config_path(&self) -> PathBuf {
        match self.config_filename.as_ref() {
            Some(val) => PathBuf::from(val),
            None => PathBuf::from("config.json"),
        }
    }
}

#[derive(Subcommand, Clone, Eq, PartialEq, Debug)]
pub enum Command {
    /// Send a single email
    Send(SendArgs),

    /// Send a plain text test email followed by an HTML one
    Demo {
        /// Recipient of both emails
        #[arg(long, required = true, value_name = "ADDRESS")]
        to: Vec<String>,
    },
}

#[derive(Args, Clone, Eq, PartialEq, Debug)]
pub struct SendArgs {
    #[arg(long, short)]
    pub subject: String,

    /// Plain text, or HTML when `--html` is given
    #[arg(long, short)]
    pub body: String,

    #[arg(long, short, required = true, value_name = "ADDRESS")]
    pub to: Vec<String>,

    /// Sender address, defaults to the username
    #[arg(long, value_name = "ADDRESS")]
    pub from: Option<String>,

    #[arg(long, value_name = "ADDRESS")]
    pub cc: Vec<String>,

    /// Delivered to but not shown in the headers
    #[arg(long, value_name = "ADDRESS")]
    pub bcc: Vec<String>,

    /// File to attach, may be repeated
    #[arg(long, short, value_name = "PATH")]
    pub attach: Vec<PathBuf>,

    /// Send the body as HTML
    #[arg(long)]
    pub html: bool,

    /// Overrides the username from the config file
    #[arg(long)]
    pub username: Option<String>,

    /// Overrides the password from the config file
    #[arg(long)]
    pub password: Option<String>,
}

impl From<SendArgs> for OutgoingEmail {
    fn from(value: SendArgs) -> Self {
        Self {
            subject: value.subject,
            body: value.body,
            to: value.to,
            from: value.from,
            cc: value.cc,
            bcc: value.bcc,
            attachments: value.attach,
            is_html: value.html,
            username: value.username,
            password: value.password,
        }
    }
}

/// Exists to provide better help messages, mirrors [`Level`] which is what is actually needed
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    /// Successful sends and anything more severe
    Success,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Success => Level::Success,
            LogLevel::Warning => Level::Warning,
            LogLevel::Error => Level::Error,
            LogLevel::Critical => Level::Critical,
        }
    }
}
