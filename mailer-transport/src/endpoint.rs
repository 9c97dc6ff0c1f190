//! Parsing of `smtp://` and `smtps://` server URLs.

use url::{Host, Url};

use crate::TransportCondition;

const SMTP_PORT: u16 = 25;
const SMTPS_PORT: u16 = 465;
const DEFAULT_HELO_DOMAIN: &str = "localhost";

/// A resolved view of a server URL.
///
/// `smtp://host[:port][/helo-domain]` connects in plain text (upgraded with
/// STARTTLS when TLS is demanded), `smtps://` speaks TLS from the first byte.
/// A URL without a scheme is treated as `smtp://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    implicit_tls: bool,
    helo_domain: String,
}

impl Endpoint {
    /// Parses a server URL.
    ///
    /// # Errors
    ///
    /// Returns [`TransportCondition::InvalidUrl`] if the URL cannot be parsed,
    /// has no host, or uses a scheme other than `smtp` or `smtps`.
    pub fn parse(server_url: &str) -> Result<Self, TransportCondition> {
        let url = if server_url.contains("://") {
            Url::parse(server_url)
        } else {
            Url::parse(&format!("smtp://{server_url}"))
        }
        .map_err(|e| TransportCondition::InvalidUrl(format!("{server_url}: {e}")))?;

        let (implicit_tls, default_port) = match url.scheme() {
            "smtp" => (false, SMTP_PORT),
            "smtps" => (true, SMTPS_PORT),
            other => {
                return Err(TransportCondition::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                return Err(TransportCondition::InvalidUrl(format!(
                    "{server_url}: missing host"
                )));
            }
        };

        let helo_domain = url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .unwrap_or(DEFAULT_HELO_DOMAIN)
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
            implicit_tls,
            helo_domain,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Whether the connection is TLS from the start (`smtps://`).
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.implicit_tls
    }

    /// The domain announced in EHLO/HELO.
    #[must_use]
    pub fn helo_domain(&self) -> &str {
        &self.helo_domain
    }
}
