//! Establishing the byte stream to the server: resolution, an optional
//! HTTP CONNECT proxy tunnel, TCP, and TLS.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};
use url::Url;

use crate::{Endpoint, TransportCondition};

/// Upper bound on the header block a proxy may send in reply to CONNECT.
const MAX_PROXY_RESPONSE: usize = 8192;

/// A connection to the server that is either plain TCP or TLS-wrapped.
pub(crate) enum Connection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Connection {
    /// Resolves, connects (through `proxy` if given) and, for `smtps://`,
    /// performs the TLS handshake, all within `deadline`.
    pub(crate) async fn open(
        endpoint: &Endpoint,
        proxy: Option<&str>,
        accept_invalid_certs: bool,
        deadline: Duration,
    ) -> Result<Self, TransportCondition> {
        let target = format!("{}:{}", endpoint.host(), endpoint.port());

        let establish = async {
            let stream = match proxy {
                Some(proxy) => tunnel(proxy, endpoint).await?,
                None => {
                    let addrs = resolve(endpoint.host(), endpoint.port())
                        .await
                        .map_err(TransportCondition::CouldNotResolveHost)?;
                    connect_any(&addrs, &target).await?
                }
            };

            let connection = Self::Plain(stream);
            if endpoint.implicit_tls() {
                connection
                    .upgrade_to_tls(endpoint.host(), accept_invalid_certs)
                    .await
            } else {
                Ok(connection)
            }
        };

        timeout(deadline, establish).await.map_err(|_| {
            TransportCondition::TimedOut(format!(
                "connecting to {target} took longer than {}ms",
                deadline.as_millis()
            ))
        })?
    }

    pub(crate) const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub(crate) async fn send(&mut self, data: &[u8]) -> Result<(), TransportCondition> {
        let result = match self {
            Self::Plain(stream) => write_flush(stream, data).await,
            Self::Tls(stream) => write_flush(&mut **stream, data).await,
        };
        result.map_err(|e| TransportCondition::Send(e.to_string()))
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportCondition> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await,
            Self::Tls(stream) => stream.read(buf).await,
        }
        .map_err(|e| TransportCondition::Receive(e.to_string()))?;

        if n == 0 {
            return Err(TransportCondition::Receive(
                "connection closed by server".to_string(),
            ));
        }
        Ok(n)
    }

    /// Wraps a plain connection in TLS, verifying the certificate against
    /// `domain` unless `accept_invalid_certs` is set.
    pub(crate) async fn upgrade_to_tls(
        self,
        domain: &str,
        accept_invalid_certs: bool,
    ) -> Result<Self, TransportCondition> {
        let Self::Plain(stream) = self else {
            return Err(TransportCondition::SslConnect(
                "connection is already TLS".to_string(),
            ));
        };

        let connector = tls_connector(accept_invalid_certs);
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| TransportCondition::SslConnect(format!("invalid domain {domain}: {e}")))?;

        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportCondition::SslConnect(e.to_string()))?;

        Ok(Self::Tls(Box::new(tls_stream)))
    }
}

async fn write_flush<W>(writer: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}

async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, String> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("{host}: {e}"))?
        .collect();

    if addrs.is_empty() {
        return Err(format!("{host}: no addresses"));
    }
    Ok(addrs)
}

/// Tries each address in turn, returning the first stream that connects.
async fn connect_any(addrs: &[SocketAddr], target: &str) -> Result<TcpStream, TransportCondition> {
    let mut last_error = None;

    for addr in addrs {
        match TcpStream::connect(*addr).await {
            Ok(stream) => {
                tracing::debug!(%addr, "Connected to {target}");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connection attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(TransportCondition::CouldNotConnect(match last_error {
        Some(e) => format!("{target}: {e}"),
        None => target.to_string(),
    }))
}

/// Opens a tunnel to `endpoint` through the HTTP proxy at `proxy`.
async fn tunnel(proxy: &str, endpoint: &Endpoint) -> Result<TcpStream, TransportCondition> {
    let proxy_url = if proxy.contains("://") {
        Url::parse(proxy)
    } else {
        Url::parse(&format!("http://{proxy}"))
    }
    .map_err(|e| TransportCondition::CouldNotResolveProxy(format!("{proxy}: {e}")))?;

    let proxy_host = proxy_url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportCondition::CouldNotResolveProxy(format!("{proxy}: missing host")))?;
    let proxy_port = proxy_url.port_or_known_default().unwrap_or(1080);
    let proxy_target = format!("{proxy_host}:{proxy_port}");

    let addrs = resolve(proxy_host, proxy_port)
        .await
        .map_err(TransportCondition::CouldNotResolveProxy)?;
    let mut stream = connect_any(&addrs, &proxy_target).await?;

    let authority = if endpoint.host().contains(':') {
        format!("[{}]:{}", endpoint.host(), endpoint.port())
    } else {
        format!("{}:{}", endpoint.host(), endpoint.port())
    };
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    crate::outgoing!("{}", request.trim_end());
    write_flush(&mut stream, request.as_bytes())
        .await
        .map_err(|e| TransportCondition::CouldNotConnect(format!("{proxy_target}: {e}")))?;

    // Read byte by byte so nothing the server sends after the tunnel opens is lost.
    let mut header = Vec::with_capacity(256);
    while !header.ends_with(b"\r\n\r\n") {
        if header.len() >= MAX_PROXY_RESPONSE {
            return Err(TransportCondition::CouldNotConnect(format!(
                "{proxy_target}: oversized CONNECT response"
            )));
        }
        let byte = stream
            .read_u8()
            .await
            .map_err(|e| TransportCondition::CouldNotConnect(format!("{proxy_target}: {e}")))?;
        header.push(byte);
    }

    let header = String::from_utf8_lossy(&header);
    let status_line = header.lines().next().unwrap_or_default();
    crate::incoming!("{}", status_line);

    let status = status_line
        .split_ascii_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok());
    match status {
        Some(code) if (200..300).contains(&code) => Ok(stream),
        _ => Err(TransportCondition::CouldNotConnect(format!(
            "{proxy_target}: proxy refused CONNECT ({status_line})"
        ))),
    }
}

fn tls_connector(accept_invalid_certs: bool) -> TlsConnector {
    let mut root_store = RootCertStore::empty();

    if !accept_invalid_certs {
        let certs = rustls_native_certs::load_native_certs();
        let (added, ignored) = root_store.add_parsable_certificates(certs.certs);
        tracing::trace!(added, ignored, "Loaded native root certificates");
        if !certs.errors.is_empty() {
            tracing::warn!(?certs.errors, "Some certificates could not be loaded");
        }
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    TlsConnector::from(Arc::new(config))
}

/// Accepts any certificate. Only reachable through `accept_invalid_certs`.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
