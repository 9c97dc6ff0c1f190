use async_trait::async_trait;
use tracing::Instrument;

use crate::{
    Endpoint, MailSendRequest, SmtpTimeouts, Transport, TransportCondition,
    connection::Connection, session::Session,
};

/// SMTP submission over TCP, with optional STARTTLS or implicit TLS.
///
/// The transport itself only holds settings; every call to
/// [`perform_mail_send`](Transport::perform_mail_send) opens its own
/// connection, so one value can be shared between concurrent submissions.
///
/// ```
/// use std::time::Duration;
///
/// use mailer_transport::{SmtpTimeouts, SmtpTransport};
///
/// let transport = SmtpTransport::new()
///     .with_proxy("http://proxy.internal:3128")
///     .with_timeouts(SmtpTimeouts {
///         connect: Duration::from_secs(5),
///         ..SmtpTimeouts::default()
///     });
/// assert_eq!(transport.proxy(), Some("http://proxy.internal:3128"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpTransport {
    proxy: Option<String>,
    timeouts: SmtpTimeouts,
    accept_invalid_certs: bool,
}

impl SmtpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tunnel connections through the HTTP proxy at `proxy`
    /// (`http://host:port`, or just `host:port`).
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: SmtpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Skip certificate verification.
    ///
    /// # Security Warning
    ///
    /// This makes TLS connections vulnerable to man-in-the-middle attacks.
    /// Only use it against test servers with self-signed certificates.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub const fn timeouts(&self) -> SmtpTimeouts {
        self.timeouts
    }

    #[must_use]
    pub const fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    async fn submit(&self, request: MailSendRequest<'_>) -> Result<(), TransportCondition> {
        validate_address(request.sender)?;
        for recipient in request.recipients {
            validate_address(recipient)?;
        }
        let endpoint = Endpoint::parse(request.server_url)?;

        let connection = Connection::open(
            &endpoint,
            self.proxy.as_deref(),
            self.accept_invalid_certs,
            self.timeouts.connect,
        )
        .await?;
        tracing::debug!(
            host = endpoint.host(),
            port = endpoint.port(),
            tls = connection.is_tls(),
            "Connected"
        );

        let mut session = Session::new(connection, self.timeouts);
        let result = self.transaction(&mut session, &endpoint, &request).await;

        // The dialogue is only still in step when the server answered us.
        match &result {
            Ok(())
            | Err(
                TransportCondition::Rejected { .. }
                | TransportCondition::LoginDenied { .. }
                | TransportCondition::TlsUnavailable(_),
            ) => {
                session.quit().await;
            }
            Err(_) => {}
        }

        result
    }

    async fn transaction(
        &self,
        session: &mut Session,
        endpoint: &Endpoint,
        request: &MailSendRequest<'_>,
    ) -> Result<(), TransportCondition> {
        session.greeting().await?;
        let mut capabilities = session.hello(endpoint.helo_domain()).await?;

        if request.use_ssl && !session.is_tls() {
            if !capabilities.has_extension("STARTTLS") {
                return Err(TransportCondition::TlsUnavailable(format!(
                    "{} does not offer STARTTLS",
                    endpoint.host()
                )));
            }
            session
                .starttls(endpoint, self.accept_invalid_certs)
                .await?;
            tracing::debug!("Upgraded connection with STARTTLS");
            capabilities = session.hello(endpoint.helo_domain()).await?;
        }

        if let Some(credentials) = request.credentials {
            let mechanisms = capabilities.auth_mechanisms();
            if capabilities.has_extension("AUTH") || !mechanisms.is_empty() {
                session.authenticate(credentials, &mechanisms).await?;
                tracing::debug!(username = credentials.username(), "Authenticated");
            } else {
                tracing::warn!(
                    host = endpoint.host(),
                    "Server does not offer AUTH, sending without authenticating"
                );
            }
        }

        session.mail_from(request.sender).await?;
        for recipient in request.recipients {
            session.rcpt_to(recipient).await?;
        }
        session.data(request.payload).await?;

        tracing::info!(
            host = endpoint.host(),
            recipients = request.recipients.len(),
            "Message accepted"
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn perform_mail_send(
        &self,
        request: MailSendRequest<'_>,
    ) -> Result<(), TransportCondition> {
        let span = tracing::debug_span!("smtp", server = request.server_url);
        self.submit(request).instrument(span).await
    }
}

/// Envelope addresses travel inside `<...>` on a command line, so they may
/// not contain angle brackets or line breaks.
fn validate_address(address: &str) -> Result<(), TransportCondition> {
    if address.is_empty() || address.contains(['\r', '\n', '<', '>']) {
        return Err(TransportCondition::InvalidAddress(address.to_string()));
    }
    Ok(())
}
