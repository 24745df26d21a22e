//! Mail server configuration, read from the process environment.
//!
//! Settings come in through `.env` / environment variables so credentials
//! stay out of the build. The loaded value is passed explicitly to
//! [`crate::smtp::MailTransport`]; there is no process-wide singleton.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::MailError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Plaintext TCP. Only sensible against a loopback test server.
    None,
    /// Implicit TLS from the first byte (SMTPS).
    Tls,
}

#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: Security,
    pub verify_certificates: bool,
    /// Domain announced in EHLO.
    pub ehlo_domain: String,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
}

impl MailConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            security: Security::Tls,
            verify_certificates: true,
            ehlo_domain: "localhost".to_owned(),
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
        }
    }

    /// Load from `MAIL_*` environment variables, reading a `.env` file
    /// first if one exists. `MAIL_HOST`, `MAIL_PORT`, `MAIL_USER` and
    /// `MAIL_PASSWORD` are required; the rest have defaults.
    pub fn from_env() -> Result<Self, MailError> {
        dotenv::dotenv().ok();

        let mut config = Self::new(
            require("MAIL_HOST")?,
            require("MAIL_PORT")?
                .parse()
                .map_err(|_| MailError::Config("MAIL_PORT is not a port number".into()))?,
            require("MAIL_USER")?,
            require("MAIL_PASSWORD")?,
        );

        config.security = match env::var("MAIL_SECURITY").as_deref() {
            Ok("tls") | Err(_) => Security::Tls,
            Ok("none") => Security::None,
            Ok(other) => {
                return Err(MailError::Config(format!(
                    "MAIL_SECURITY must be \"tls\" or \"none\", got {other:?}"
                )))
            }
        };
        config.verify_certificates = env::var("MAIL_TLS_VERIFY")
            .map(|v| v != "false")
            .unwrap_or(true);
        if let Ok(domain) = env::var("MAIL_EHLO_DOMAIN") {
            config.ehlo_domain = domain;
        }
        config.connect_timeout = Duration::from_secs(secs_or("MAIL_CONNECT_TIMEOUT_SECS", 30)?);
        config.io_timeout = Duration::from_secs(secs_or("MAIL_IO_TIMEOUT_SECS", 60)?);

        Ok(config)
    }
}

// The password must never end up in logs, so Debug is written by hand.
impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("security", &self.security)
            .field("verify_certificates", &self.verify_certificates)
            .field("ehlo_domain", &self.ehlo_domain)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

fn require(name: &str) -> Result<String, MailError> {
    env::var(name).map_err(|_| MailError::Config(format!("{name} is not set")))
}

fn secs_or(name: &str, default: u64) -> Result<u64, MailError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| MailError::Config(format!("{name} is not a number of seconds"))),
        Err(_) => Ok(default),
    }
}
