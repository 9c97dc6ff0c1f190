use mailer_transport::{Credentials, MailSendRequest, SmtpTransport, Transport};

use crate::{SendError, compose, lifecycle};

/// An immutable, reusable handle for sending mail.
///
/// Created by [`Builder::build`](crate::Builder::build). The configuration never
/// changes after construction, so a client can be shared between threads and
/// used for any number of sends.
#[derive(Debug, Clone)]
pub struct Client<T = SmtpTransport> {
    server_url: String,
    sender_email: String,
    credentials: Option<Credentials>,
    ssl: bool,
    transport: T,
}

impl<T: Transport> Client<T> {
    pub(crate) const fn new(
        server_url: String,
        sender_email: String,
        credentials: Option<Credentials>,
        ssl: bool,
        transport: T,
    ) -> Self {
        Self {
            server_url,
            sender_email,
            credentials,
            ssl,
            transport,
        }
    }

    /// Sends one message to `recipient`, blocking until the transport is done.
    ///
    /// # Errors
    ///
    /// Returns the [`SendError`] the transport failure was classified as.
    ///
    /// # Panics
    ///
    /// Panics if `recipient` or `body` is empty, if [`initialize`](crate::initialize)
    /// has not been called, or if called from within an async context (use
    /// [`send_async`](Self::send_async) there).
    pub fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError> {
        lifecycle::global().block_on(self.send_async(recipient, subject, body))
    }

    /// Sends one message to `recipient` on the caller's runtime.
    ///
    /// # Errors
    ///
    /// Returns the [`SendError`] the transport failure was classified as.
    ///
    /// # Panics
    ///
    /// Panics if `recipient` or `body` is empty.
    pub async fn send_async(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), SendError> {
        assert!(!recipient.is_empty(), "recipient must not be empty");
        assert!(!body.is_empty(), "body must not be empty");

        let payload = compose(&self.sender_email, recipient, subject, body);
        let recipients = [recipient];

        let result = self
            .transport
            .perform_mail_send(MailSendRequest {
                server_url: &self.server_url,
                use_ssl: self.ssl,
                credentials: self.credentials.as_ref(),
                sender: &self.sender_email,
                recipients: &recipients,
                payload: &payload,
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!(server = %self.server_url, recipient, "Mail sent");
                Ok(())
            }
            Err(condition) => {
                let error = SendError::from(condition);
                tracing::warn!(
                    server = %self.server_url,
                    recipient,
                    error = %error,
                    detail = %error.condition(),
                    "Mail not sent"
                );
                Err(error)
            }
        }
    }
}

impl<T> Client<T> {
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn sender_email(&self) -> &str {
        &self.sender_email
    }

    pub const fn ssl_enabled(&self) -> bool {
        self.ssl
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(Credentials::username)
    }

    pub const fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }
}
