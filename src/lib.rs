mod cli;
pub mod config;
pub mod email;
pub mod logging;

use anyhow::bail;
use log::{debug, info};

pub use cli::{Cli, Command, LogLevel, SendArgs};
use config::Config;
pub use email::{Delivery, EmailSender, OutgoingEmail, SendError};
pub use logging::{Level, LogConfig, LogService, Logger};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(&cli.get_config_path())?;

    let mut log_config = config.logging.clone();
    if let Some(level) = cli.log_level {
        log_config.log_level = level.into();
    }
    if cli.no_log_file {
        log_config.log_to_file = false;
    }
    let logging = LogService::new(log_config);
    logging.get_logger(env!("CARGO_PKG_NAME")).install()?;
    debug!("Starting with {:?}", logging.config());

    let sender = EmailSender::new(config.smtp.server(), logging.get_logger("mailer::email"))
        .with_credentials(config.smtp.username.clone(), config.smtp.password.clone());

    match cli.command {
        Command::Send(args) => {
            let email = OutgoingEmail::from(args);
            let delivery = sender.send_email(&email)?;
            for skipped in &delivery.skipped_attachments {
                info!("Not attached: {:?} ({})", skipped.path, skipped.reason);
            }
        }
        Command::Demo { to } => {
            let (plain, html) = demo_emails(&to);
            let results = [sender.send_email(&plain), sender.send_html_email(&html)];
            let failed = results.iter().filter(|result| result.is_err()).count();
            if failed > 0 {
                bail!("{failed} of the demo emails failed to send");
            }
        }
    }
    Ok(())
}

/// A plain text email and one meant for [`EmailSender::send_html_email`]
fn demo_emails(to: &[String]) -> (OutgoingEmail, OutgoingEmail) {
    (
        OutgoingEmail::new(
            "Test email",
            "This is a test email sent by mailer.",
            to.iter().cloned(),
        ),
        OutgoingEmail::new(
            "Monthly report",
            "<h1>Monthly report</h1><p>The full report is attached.</p>",
            to.iter().cloned(),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_emails_share_recipients() {
        let to = vec!["a@x.com".to_string()];
        let (plain, html) = demo_emails(&to);
        assert!(!plain.is_html);
        assert!(html.body.starts_with("<h1>"));
        assert_eq!(plain.to, to);
        assert_eq!(html.to, to);
    }
}
