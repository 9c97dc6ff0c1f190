//! Transport collaborator for the `mailer` client.
//!
//! A [`Transport`] takes a fully composed message and submits it to a mail
//! server. The crate ships [`SmtpTransport`], an SMTP submission client built
//! on tokio and rustls, and defines the open set of [`TransportCondition`]s a
//! transport reports when it fails.
//!
//! ```no_run
//! use mailer_transport::{MailSendRequest, SmtpTransport, Transport};
//!
//! # async fn example() -> Result<(), mailer_transport::TransportCondition> {
//! let payload = b"From: a@example.com\r\nTo: b@example.com\r\nSubject: Hi\r\n\r\nHello\r\n";
//! SmtpTransport::new()
//!     .perform_mail_send(MailSendRequest {
//!         server_url: "smtp://localhost:2525",
//!         use_ssl: false,
//!         credentials: None,
//!         sender: "a@example.com",
//!         recipients: &["b@example.com"],
//!         payload,
//!     })
//!     .await
//! # }
//! ```

#[macro_use]
pub mod logging;

mod connection;
mod endpoint;
mod error;
mod response;
mod session;
mod smtp;
pub mod timeouts;

use std::fmt;

use async_trait::async_trait;

pub use endpoint::Endpoint;
pub use error::{Stage, TransportCondition};
pub use response::Response;
pub use smtp::SmtpTransport;
pub use timeouts::SmtpTimeouts;

pub use tracing;

/// Username and password for SMTP authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
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

/// Everything a transport needs to submit one message.
#[derive(Debug, Clone, Copy)]
pub struct MailSendRequest<'a> {
    /// Where to submit, e.g. `smtp://mail.example.com:587`.
    pub server_url: &'a str,
    /// Whether TLS is mandatory for this submission.
    pub use_ssl: bool,
    pub credentials: Option<&'a Credentials>,
    /// Envelope sender.
    pub sender: &'a str,
    /// Envelope recipients.
    pub recipients: &'a [&'a str],
    /// The formatted message, header block and body.
    pub payload: &'a [u8],
}

/// A mail submission capability.
///
/// Implementations allocate their per-call resources (connections, buffers)
/// inside [`perform_mail_send`](Transport::perform_mail_send), so a single
/// transport may serve concurrent submissions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Submit `request.payload` to every recipient in `request.recipients`.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportCondition`] describing why the submission failed.
    async fn perform_mail_send(
        &self,
        request: MailSendRequest<'_>,
    ) -> Result<(), TransportCondition>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn perform_mail_send(
        &self,
        request: MailSendRequest<'_>,
    ) -> Result<(), TransportCondition> {
        (**self).perform_mail_send(request).await
    }
}
