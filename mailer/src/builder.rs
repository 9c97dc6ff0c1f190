//! Fluent configuration of a [`Client`].

use mailer_transport::{Credentials, SmtpTransport, Transport};

use crate::Client;

/// Accumulates the configuration of a [`Client`].
///
/// A builder starts with SSL disabled and no credentials. [`build`](Self::build)
/// consumes it, so a builder can produce exactly one client:
///
/// ```compile_fail
/// let builder = mailer::Builder::new("smtp://localhost:2525", "a@example.com");
/// let first = builder.build();
/// let second = builder.build(); // the builder has been moved
/// ```
///
/// # Examples
///
/// ```
/// use mailer::Builder;
///
/// let client = Builder::new("smtp://smtp.example.com:587", "me@example.com")
///     .ssl(true)
///     .auth("me", "secret")
///     .build();
///
/// assert!(client.ssl_enabled());
/// assert_eq!(client.username(), Some("me"));
/// ```
#[derive(Debug)]
pub struct Builder<T = SmtpTransport> {
    server_url: String,
    sender_email: String,
    credentials: Option<Credentials>,
    ssl: bool,
    transport: T,
}

impl Builder {
    /// Starts configuring a client that submits to `server_url` as `sender_email`.
    ///
    /// # Panics
    ///
    /// Panics if either argument is empty.
    #[must_use]
    pub fn new(server_url: impl Into<String>, sender_email: impl Into<String>) -> Self {
        let server_url = server_url.into();
        let sender_email = sender_email.into();
        assert!(!server_url.is_empty(), "server URL must not be empty");
        assert!(!sender_email.is_empty(), "sender email must not be empty");

        Self {
            server_url,
            sender_email,
            credentials: None,
            ssl: false,
            transport: SmtpTransport::default(),
        }
    }
}

impl<T: Transport> Builder<T> {
    /// Require TLS for every send.
    #[must_use]
    pub const fn ssl(mut self, enabled: bool) -> Self {
        self.ssl = enabled;
        self
    }

    /// Authenticate with `username` and `password`.
    ///
    /// # Panics
    ///
    /// Panics if either argument is empty; credentials are all or nothing.
    #[must_use]
    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let password = password.into();
        assert!(!username.is_empty(), "username must not be empty");
        assert!(!password.is_empty(), "password must not be empty");

        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Replace the transport the client hands messages to.
    #[must_use]
    pub fn transport<U: Transport>(self, transport: U) -> Builder<U> {
        Builder {
            server_url: self.server_url,
            sender_email: self.sender_email,
            credentials: self.credentials,
            ssl: self.ssl,
            transport,
        }
    }

    /// Freezes the configuration into a [`Client`].
    #[must_use]
    pub fn build(self) -> Client<T> {
        Client::new(
            self.server_url,
            self.sender_email,
            self.credentials,
            self.ssl,
            self.transport,
        )
    }
}
