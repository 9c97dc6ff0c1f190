//! Conditions reported by a transport when a mail submission fails.
//!
//! The set is open-ended: transports may grow new conditions over time, and
//! callers that classify them must keep a fallback arm.

use std::fmt;

use thiserror::Error;

/// The point of the SMTP dialogue at which the server refused to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The initial 220 greeting.
    Greeting,
    /// EHLO, and the HELO fallback.
    Hello,
    /// `MAIL FROM`.
    MailFrom,
    /// `RCPT TO`.
    RcptTo,
    /// The `DATA` command itself.
    Data,
    /// The reply after the terminating `.`.
    DataEnd,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Greeting => "greeting",
            Self::Hello => "EHLO",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
            Self::DataEnd => "end of DATA",
        })
    }
}

/// A failure reported by a [`Transport`](crate::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportCondition {
    /// The server host name could not be resolved.
    #[error("Couldn't resolve host name: {0}")]
    CouldNotResolveHost(String),

    /// The proxy host name could not be resolved.
    #[error("Couldn't resolve proxy name: {0}")]
    CouldNotResolveProxy(String),

    /// No connection could be established to the server or proxy.
    #[error("Couldn't connect to server: {0}")]
    CouldNotConnect(String),

    /// An operation exceeded its deadline.
    #[error("Timeout was reached: {0}")]
    TimedOut(String),

    /// TLS negotiation failed.
    #[error("SSL connect error: {0}")]
    SslConnect(String),

    /// TLS was demanded but the server does not offer STARTTLS, or refused it.
    #[error("Requested SSL level failed: {0}")]
    TlsUnavailable(String),

    /// The server refused the supplied credentials, or no usable mechanism exists.
    #[error("Login denied: {message}")]
    LoginDenied { code: Option<u16>, message: String },

    /// Writing to the connection failed.
    #[error("Failed sending data to the peer: {0}")]
    Send(String),

    /// The server answered a command with a failure reply.
    #[error("Server rejected {stage}: {code} {message}")]
    Rejected {
        stage: Stage,
        code: u16,
        message: String,
    },

    /// Reading from the connection failed, or the peer hung up.
    #[error("Failure when receiving data from the peer: {0}")]
    Receive(String),

    /// The server reply could not be understood.
    #[error("Weird server reply: {0}")]
    WeirdReply(String),

    /// The server URL is malformed or uses an unsupported scheme.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// An envelope address contains characters that would corrupt the dialogue.
    #[error("Invalid envelope address: {0:?}")]
    InvalidAddress(String),
}

impl TransportCondition {
    /// The SMTP reply code attached to this condition, if the server sent one.
    #[must_use]
    pub const fn smtp_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            Self::LoginDenied { code, .. } => *code,
            _ => None,
        }
    }
}
