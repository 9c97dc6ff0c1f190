//! Mock SMTP server for exercising the transport against scripted replies.
//!
//! The server can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Answer each command with a configured reply
//! - Advertise arbitrary EHLO capabilities, including AUTH and STARTTLS
//! - Walk AUTH LOGIN through its username and password challenges
//! - Negotiate TLS with a self-signed certificate, via STARTTLS or implicitly
//! - Delay the greeting or replies to provoke timeouts
//! - Drop the connection after a number of commands
//! - Record every command and the message content it received
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_to_response(550, "User unknown")
//!     .build()
//!     .await?;
//!
//! // Point the transport at server.url()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    /// AUTH with everything after the keyword, e.g. `PLAIN AGFsaWNl...`
    Auth(String),
    /// A line sent in answer to a 334 challenge during AUTH LOGIN
    AuthResponse(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content between DATA and the terminating `.`, as sent
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let cap_count = self.capabilities.len();

        for (i, cap) in self.capabilities.iter().enumerate() {
            let separator = if i < cap_count - 1 { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{cap}\r\n", self.code);
        }

        response.into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_response: EhloResponse,
    helo_response: SmtpResponse,
    starttls_response: SmtpResponse,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,

    tls: bool,
    implicit_tls: bool,

    // Failure injection
    connection_delay: Option<Duration>,
    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_response: EhloResponse {
                code: 250,
                capabilities: vec!["localhost".to_string(), "SIZE 10000".to_string()],
            },
            helo_response: SmtpResponse::new(250, "Hello"),
            starttls_response: SmtpResponse::new(502, "Command not implemented"),
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            tls: false,
            implicit_tls: false,
            connection_delay: None,
            response_delay: None,
            drop_after_commands: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `smtp://` URL pointing at this server
    #[must_use]
    pub fn url(&self) -> String {
        format!("smtp://{}", self.addr)
    }

    /// `smtps://` URL pointing at this server
    #[must_use]
    pub fn smtps_url(&self) -> String {
        format!("smtps://{}", self.addr)
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// The content of the first message received, if any
    pub async fn message(&self) -> Option<Vec<u8>> {
        self.commands().await.into_iter().find_map(|c| match c {
            SmtpCommand::MessageContent(content) => Some(content),
            _ => None,
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        tls: Option<TlsAcceptor>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), BoxError> {
        if let Some(delay) = config.connection_delay {
            tokio::time::sleep(delay).await;
        }

        if config.implicit_tls
            && let Some(acceptor) = tls
        {
            let stream = acceptor.accept(stream).await?;
            Self::dialogue(stream, &config, &commands, true).await?;
            return Ok(());
        }

        let outcome = Self::dialogue(stream, &config, &commands, true).await?;
        if let Dialogue::StartTls(stream) = outcome {
            // Without a certificate there is nothing to negotiate: hang up so
            // the client's handshake fails.
            if let Some(acceptor) = tls {
                let stream = acceptor.accept(stream).await?;
                Self::dialogue(stream, &config, &commands, false).await?;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    async fn dialogue<S>(
        stream: S,
        config: &MockServerConfig,
        commands: &RwLock<Vec<SmtpCommand>>,
        greet: bool,
    ) -> Result<Dialogue<S>, BoxError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(stream);
        let mut line = String::new();
        let mut command_count = 0;

        if greet {
            stream.write_all(&config.greeting.to_bytes()).await?;
            stream.flush().await?;
        }

        loop {
            line.clear();

            if let Some(drop_after) = config.drop_after_commands
                && command_count >= drop_after
            {
                return Ok(Dialogue::Closed);
            }

            let read_result = timeout(Duration::from_secs(10), stream.read_line(&mut line)).await;
            let Ok(bytes_read) = read_result else {
                return Ok(Dialogue::Closed);
            };
            if bytes_read? == 0 {
                return Ok(Dialogue::Closed);
            }

            command_count += 1;

            let cmd_line = line.trim().to_string();
            tracing::debug!("Mock server received: {}", cmd_line);

            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line.as_str(), ""));
            let argument = argument.to_string();

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (config.ehlo_response.to_bytes(), SmtpCommand::Ehlo(argument)),
                "HELO" => (config.helo_response.to_bytes(), SmtpCommand::Helo(argument)),
                "AUTH" if argument.eq_ignore_ascii_case("LOGIN") => {
                    commands.write().await.push(SmtpCommand::Auth(argument));

                    // "Username:" and "Password:"
                    for prompt in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                        stream
                            .write_all(&SmtpResponse::new(334, prompt).to_bytes())
                            .await?;
                        stream.flush().await?;

                        line.clear();
                        if stream.read_line(&mut line).await? == 0 {
                            return Ok(Dialogue::Closed);
                        }
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::AuthResponse(line.trim().to_string()));
                    }

                    stream.write_all(&config.auth_response.to_bytes()).await?;
                    stream.flush().await?;
                    continue;
                }
                "AUTH" => (config.auth_response.to_bytes(), SmtpCommand::Auth(argument)),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "STARTTLS" => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    stream.write_all(&config.starttls_response.to_bytes()).await?;
                    stream.flush().await?;
                    if config.starttls_response.code == 220 {
                        // The client waits for 220 before its handshake, so
                        // nothing is left in the read buffer.
                        return Ok(Dialogue::StartTls(stream.into_inner()));
                    }
                    continue;
                }
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    stream.write_all(&config.quit_response.to_bytes()).await?;
                    stream.flush().await?;
                    return Ok(Dialogue::Closed);
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.clone()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());

            if let Some(delay) = config.response_delay {
                tokio::time::sleep(delay).await;
            }
            stream.write_all(&response).await?;
            stream.flush().await?;

            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = Vec::new();
                let mut data_line = Vec::new();

                loop {
                    data_line.clear();
                    if stream.read_until(b'\n', &mut data_line).await? == 0 {
                        return Ok(Dialogue::Closed);
                    }

                    if data_line == b".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content));

                        if let Some(delay) = config.response_delay {
                            tokio::time::sleep(delay).await;
                        }
                        stream
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        stream.flush().await?;
                        break;
                    }

                    message_content.extend_from_slice(&data_line);
                }
            }
        }
    }
}

/// How a plaintext dialogue ended.
enum Dialogue<S> {
    Closed,
    /// STARTTLS was accepted; the stream is ready for the handshake.
    StartTls(S),
}

/// Self-signed certificate for `localhost`, generated per server.
fn tls_acceptor() -> Result<TlsAcceptor, BoxError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let cert_der = CertificateDer::from(cert.serialize_der()?);
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Set the EHLO response; the first capability is the greeting line
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: &[&str]) -> Self {
        self.config.ehlo_response = EhloResponse {
            code,
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
        };
        self
    }

    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the STARTTLS response. After a 220 the server negotiates TLS when
    /// built [`with_tls`](Self::with_tls), and hangs up otherwise.
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Serve a self-signed certificate when the client sends STARTTLS
    #[must_use]
    pub const fn with_tls(mut self) -> Self {
        self.config.tls = true;
        self
    }

    /// Negotiate TLS as soon as a connection is accepted, as on `smtps://`
    #[must_use]
    pub const fn with_implicit_tls(mut self) -> Self {
        self.config.tls = true;
        self.config.implicit_tls = true;
        self
    }

    /// Delay the greeting after accepting a connection
    #[must_use]
    pub const fn with_connection_delay(mut self, delay: Duration) -> Self {
        self.config.connection_delay = Some(delay);
        self
    }

    /// Delay every response after the greeting
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Build and start the mock SMTP server on a random local port
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port, or if TLS was
    /// requested and the certificate cannot be generated
    pub async fn build(self) -> Result<MockSmtpServer, BoxError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let tls = if self.config.tls {
            Some(tls_acceptor()?)
        } else {
            None
        };

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept with a timeout so the shutdown flag is noticed
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let tls = tls.clone();
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) =
                            MockSmtpServer::handle_client(stream, config, tls, commands).await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
        })
    }
}
