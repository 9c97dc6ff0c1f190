//! One SMTP dialogue over an established [`Connection`].

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::time::timeout;

use crate::{
    Credentials, Endpoint, Response, SmtpTimeouts, Stage, TransportCondition,
    connection::Connection,
};

/// Initial size of the reply buffer.
const BUFFER_SIZE: usize = 8192;

/// Replies larger than this are treated as hostile (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

pub(crate) struct Session {
    connection: Option<Connection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    timeouts: SmtpTimeouts,
}

impl Session {
    pub(crate) fn new(connection: Connection, timeouts: SmtpTimeouts) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            timeouts,
        }
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_tls)
    }

    /// Reads the 220 greeting.
    pub(crate) async fn greeting(&mut self) -> Result<Response, TransportCondition> {
        let response = self.read_reply("greeting").await?;
        expect_success(response, Stage::Greeting)
    }

    /// EHLO, falling back to HELO when the server does not know EHLO.
    pub(crate) async fn hello(&mut self, domain: &str) -> Result<Response, TransportCondition> {
        let response = self.command(&format!("EHLO {domain}")).await?;
        if response.is_success() {
            return Ok(response);
        }

        tracing::debug!(code = response.code, "EHLO refused, falling back to HELO");
        let response = self.command(&format!("HELO {domain}")).await?;
        expect_success(response, Stage::Hello)
    }

    /// Issues STARTTLS and wraps the connection. The caller must repeat EHLO.
    ///
    /// A refusal is [`TransportCondition::TlsUnavailable`], the same as a server
    /// that never advertised STARTTLS. Only a failed handshake is `SslConnect`.
    pub(crate) async fn starttls(
        &mut self,
        endpoint: &Endpoint,
        accept_invalid_certs: bool,
    ) -> Result<(), TransportCondition> {
        let response = self.command("STARTTLS").await?;
        if !response.is_success() {
            return Err(TransportCondition::TlsUnavailable(format!(
                "STARTTLS refused: {} {}",
                response.code,
                response.message()
            )));
        }

        // Anything buffered before the handshake must not be trusted afterwards.
        self.buffer_pos = 0;

        let connection = self
            .connection
            .take()
            .ok_or_else(|| TransportCondition::Receive("connection closed".to_string()))?;
        let upgraded = timeout(
            self.timeouts.connect,
            connection.upgrade_to_tls(endpoint.host(), accept_invalid_certs),
        )
        .await
        .map_err(|_| TransportCondition::TimedOut("TLS handshake".to_string()))??;
        self.connection = Some(upgraded);

        Ok(())
    }

    /// Authenticates with the first mechanism both sides support.
    ///
    /// `mechanisms` is what the server advertised; PLAIN is preferred over LOGIN.
    pub(crate) async fn authenticate(
        &mut self,
        credentials: &Credentials,
        mechanisms: &[String],
    ) -> Result<(), TransportCondition> {
        let supports = |name: &str| mechanisms.iter().any(|m| m == name);

        let response = if supports("PLAIN") {
            let token = STANDARD.encode(format!(
                "\0{}\0{}",
                credentials.username(),
                credentials.password()
            ));
            self.secret_command(&format!("AUTH PLAIN {token}"), "AUTH PLAIN <credentials>")
                .await?
        } else if supports("LOGIN") {
            let response = self.command("AUTH LOGIN").await?;
            if response.code != 334 {
                return Err(login_denied(&response));
            }
            let response = self
                .secret_command(&STANDARD.encode(credentials.username()), "<username>")
                .await?;
            if response.code != 334 {
                return Err(login_denied(&response));
            }
            self.secret_command(&STANDARD.encode(credentials.password()), "<password>")
                .await?
        } else {
            return Err(TransportCondition::LoginDenied {
                code: None,
                message: format!(
                    "no supported mechanism among [{}]",
                    mechanisms.join(", ")
                ),
            });
        };

        if response.is_success() {
            Ok(())
        } else {
            Err(login_denied(&response))
        }
    }

    pub(crate) async fn mail_from(&mut self, sender: &str) -> Result<(), TransportCondition> {
        let response = self.command(&format!("MAIL FROM:<{sender}>")).await?;
        expect_success(response, Stage::MailFrom).map(drop)
    }

    pub(crate) async fn rcpt_to(&mut self, recipient: &str) -> Result<(), TransportCondition> {
        let response = self.command(&format!("RCPT TO:<{recipient}>")).await?;
        expect_success(response, Stage::RcptTo).map(drop)
    }

    /// Sends DATA, the dot-stuffed payload, and the terminating `.`.
    pub(crate) async fn data(&mut self, payload: &[u8]) -> Result<(), TransportCondition> {
        let response = self.command("DATA").await?;
        if response.code != 354 {
            return Err(rejected(&response, Stage::Data));
        }

        let encoded = encode_data(payload);
        crate::outgoing!("<{} bytes of message data>", encoded.len());

        let deadline = self.timeouts.data;
        let transfer = async {
            self.connection_mut()?.send(&encoded).await?;
            self.read_response().await
        };
        let response = timeout(deadline, transfer).await.map_err(|_| {
            TransportCondition::TimedOut(format!(
                "message transfer took longer than {}ms",
                deadline.as_millis()
            ))
        })??;
        crate::incoming!("{} {}", response.code, response.message());

        expect_success(response, Stage::DataEnd).map(drop)
    }

    /// Says goodbye. Failures are irrelevant at this point and only logged.
    pub(crate) async fn quit(&mut self) {
        if let Err(e) = self.command("QUIT").await {
            tracing::debug!(error = %e, "QUIT failed");
        }
    }

    async fn command(&mut self, line: &str) -> Result<Response, TransportCondition> {
        self.secret_command(line, line).await
    }

    /// Sends `line`, logging `shown` in its place.
    async fn secret_command(
        &mut self,
        line: &str,
        shown: &str,
    ) -> Result<Response, TransportCondition> {
        crate::outgoing!("{}", shown);
        self.connection_mut()?
            .send(format!("{line}\r\n").as_bytes())
            .await?;
        self.read_reply(shown).await
    }

    async fn read_reply(&mut self, context: &str) -> Result<Response, TransportCondition> {
        let deadline = self.timeouts.command;
        let response = timeout(deadline, self.read_response())
            .await
            .map_err(|_| {
                TransportCondition::TimedOut(format!(
                    "no reply to '{context}' within {}ms",
                    deadline.as_millis()
                ))
            })??;
        crate::incoming!("{} {}", response.code, response.message());
        Ok(response)
    }

    async fn read_response(&mut self) -> Result<Response, TransportCondition> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(TransportCondition::WeirdReply(format!(
                        "reply exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or_else(|| TransportCondition::Receive("connection closed".to_string()))?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }

    fn connection_mut(&mut self) -> Result<&mut Connection, TransportCondition> {
        self.connection
            .as_mut()
            .ok_or_else(|| TransportCondition::Send("connection closed".to_string()))
    }
}

fn expect_success(response: Response, stage: Stage) -> Result<Response, TransportCondition> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(rejected(&response, stage))
    }
}

fn rejected(response: &Response, stage: Stage) -> TransportCondition {
    TransportCondition::Rejected {
        stage,
        code: response.code,
        message: response.message(),
    }
}

fn login_denied(response: &Response) -> TransportCondition {
    TransportCondition::LoginDenied {
        code: Some(response.code),
        message: response.message(),
    }
}

/// Prepares a payload for the DATA phase: bare LF becomes CRLF, lines
/// starting with `.` are dot-stuffed, and the terminating `.` line is appended.
pub(crate) fn encode_data(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 32 + 5);
    let mut at_line_start = true;
    let mut previous = None;

    for &byte in payload {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && previous != Some(b'\r') {
            out.push(b'\r');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
        previous = Some(byte);
    }

    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
