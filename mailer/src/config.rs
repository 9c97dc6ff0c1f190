//! File-based configuration, written in RON.
//!
//! ```ron
//! (
//!     server_url: "smtp://smtp.example.com:587",
//!     sender_email: "me@example.com",
//!     ssl: true,
//!     auth: Some((username: "me")),
//!     timeouts: (connect_secs: 10),
//! )
//! ```
//!
//! The password may be left out of the file and supplied through the
//! `MAILER_PASSWORD` environment variable instead.

use std::path::{Path, PathBuf};

use mailer_transport::{SmtpTransport, timeouts::TimeoutSecs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Builder;

pub const CONFIG_ENV: &str = "MAILER_CONFIG";
pub const PASSWORD_ENV: &str = "MAILER_PASSWORD";
const DEFAULT_PATHS: [&str; 2] = ["./mailer.config.ron", "/etc/mailer/mailer.config.ron"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("MAILER_CONFIG points to non-existent file: {}", .0.display())]
    MissingEnvFile(PathBuf),

    #[error("No configuration file found. Tried MAILER_CONFIG, {}", DEFAULT_PATHS.join(", "))]
    NotFound,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("timeouts.{0} must be at least one second")]
    ZeroTimeout(&'static str),

    #[error("No password for {username}: set auth.password or MAILER_PASSWORD")]
    MissingPassword { username: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailerConfig {
    pub server_url: String,
    pub sender_email: String,

    /// Require TLS. Default: false
    #[serde(default)]
    pub ssl: bool,

    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// HTTP CONNECT proxy, `host:port` or `http://host:port`
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutSecs,

    /// Skip certificate verification. Only for test servers.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl MailerConfig {
    /// Locates the configuration file using the following precedence:
    /// 1. `MAILER_CONFIG` environment variable
    /// 2. ./mailer.config.ron (current working directory)
    /// 3. /etc/mailer/mailer.config.ron (system-wide config)
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingEnvFile`] if `MAILER_CONFIG` names a file that does
    /// not exist, [`ConfigError::NotFound`] if no candidate exists.
    pub fn find() -> Result<PathBuf, ConfigError> {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Ok(path);
            }
            return Err(ConfigError::MissingEnvFile(path));
        }

        DEFAULT_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .ok_or(ConfigError::NotFound)
    }

    /// Reads and parses the configuration at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// [`find`](Self::find) followed by [`from_file`](Self::from_file).
    ///
    /// # Errors
    ///
    /// Any error either step returns.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(Self::find()?)
    }

    /// The transport described by the proxy, timeout and certificate settings.
    #[must_use]
    pub fn transport(&self) -> SmtpTransport {
        let transport = SmtpTransport::new()
            .with_timeouts(self.timeouts.into())
            .accept_invalid_certs(self.accept_invalid_certs);

        match &self.proxy {
            Some(proxy) => transport.with_proxy(proxy.clone()),
            None => transport,
        }
    }

    /// Turns the configuration into a [`Builder`], taking the password from
    /// `MAILER_PASSWORD` when the file does not set one.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Empty`] for an empty required field,
    /// [`ConfigError::ZeroTimeout`] for a timeout of zero seconds, and
    /// [`ConfigError::MissingPassword`] when credentials are incomplete.
    pub fn into_builder(self) -> Result<Builder, ConfigError> {
        self.into_builder_with_password(std::env::var(PASSWORD_ENV).ok())
    }

    fn into_builder_with_password(
        self,
        env_password: Option<String>,
    ) -> Result<Builder, ConfigError> {
        if self.server_url.is_empty() {
            return Err(ConfigError::Empty("server_url"));
        }
        if self.sender_email.is_empty() {
            return Err(ConfigError::Empty("sender_email"));
        }
        for (name, secs) in [
            ("connect_secs", self.timeouts.connect_secs),
            ("command_secs", self.timeouts.command_secs),
            ("data_secs", self.timeouts.data_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }

        let transport = self.transport();
        let mut builder = Builder::new(self.server_url, self.sender_email)
            .ssl(self.ssl)
            .transport(transport);

        if let Some(auth) = self.auth {
            if auth.username.is_empty() {
                return Err(ConfigError::Empty("auth.username"));
            }
            let password = auth
                .password
                .filter(|p| !p.is_empty())
                .or_else(|| env_password.filter(|p| !p.is_empty()))
                .ok_or_else(|| ConfigError::MissingPassword {
                    username: auth.username.clone(),
                })?;
            builder = builder.auth(auth.username, password);
        }

        Ok(builder)
    }
}
