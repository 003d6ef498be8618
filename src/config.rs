use std::{fs, path::Path};

use anyhow::Context;
use log::debug;
use serde::Deserialize;

use crate::{
    email::{SmtpServer, DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER},
    logging::LogConfig,
};

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server to send through and the default credentials
    pub smtp: SmtpConfig,

    /// Where and how much to log
    pub logging: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SMTP_SERVER.to_string(),
            port: DEFAULT_SMTP_PORT,
            username: None,
            password: None,
        }
    }
}

impl SmtpConfig {
    pub fn server(&self) -> SmtpServer {
        SmtpServer::new(self.server.clone(), self.port)
    }
}

impl Config {
    pub fn load_from(config_path: &Path) -> anyhow::Result<Config> {
        debug!("Loading Config from: {config_path:?}");
        let file_contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read contents of {config_path:?}"))?;
        let result = serde_json::from_str(&file_contents)
            .with_context(|| format!("Failed to parse contents of {config_path:?}"))?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::logging::Level;
    use tempfile::TempDir;

    #[test]
    fn full_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "smtp": {
                    "server": "smtp.example.com",
                    "port": 2525,
                    "username": "me@example.com",
                    "password": "secret"
                },
                "logging": {
                    "log_to_file": false,
                    "log_file_path": "out/mail.log",
                    "log_level": "WARNING"
                }
            }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.smtp.server(), SmtpServer::new("smtp.example.com", 2525));
        assert_eq!(config.smtp.username.as_deref(), Some("me@example.com"));
        assert_eq!(config.smtp.password.as_deref(), Some("secret"));
        assert_eq!(
            config.logging,
            LogConfig {
                log_to_file: false,
                log_file_path: PathBuf::from("out/mail.log"),
                log_level: Level::Warning,
            }
        );
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"smtp": {"username": "me@x.com"}}"#).unwrap();
        assert_eq!(config.smtp.server, DEFAULT_SMTP_SERVER);
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.password, None);
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn missing_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err}").contains("absent.json"));
    }

    #[test]
    fn invalid_json_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err}").starts_with("Failed to parse contents of"));
    }
}
