//! Typed outcomes of a failed send.

use mailer_transport::{Stage, TransportCondition};
use thiserror::Error;

/// Why a [`Client::send`](crate::Client::send) did not deliver the message.
///
/// Every classified variant keeps the transport's own condition as its
/// [`source`](std::error::Error::source), so the detail is never lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] TransportCondition),

    #[error("Connection timed out")]
    ConnectionTimedOut(#[source] TransportCondition),

    #[error("Connection SSL failed")]
    ConnectionSSLFailed(#[source] TransportCondition),

    #[error("Authentication failed")]
    AuthenticationFailed(#[source] TransportCondition),

    #[error("Unable to resolve host")]
    UnableToResolveHost(#[source] TransportCondition),

    #[error("Unable to resolve proxy")]
    UnableToResolveProxy(#[source] TransportCondition),

    #[error("Unable to send data")]
    UnableToSendData(#[source] TransportCondition),

    /// The transport failed in a way none of the other variants describe.
    #[error("Unclassified transport error: {0}")]
    Unclassified(TransportCondition),
}

impl SendError {
    /// The transport condition this outcome was classified from.
    #[must_use]
    pub const fn condition(&self) -> &TransportCondition {
        match self {
            Self::ConnectionFailed(c)
            | Self::ConnectionTimedOut(c)
            | Self::ConnectionSSLFailed(c)
            | Self::AuthenticationFailed(c)
            | Self::UnableToResolveHost(c)
            | Self::UnableToResolveProxy(c)
            | Self::UnableToSendData(c)
            | Self::Unclassified(c) => c,
        }
    }

    /// Whether this is one of the seven classified outcomes.
    #[must_use]
    pub const fn is_classified(&self) -> bool {
        !matches!(self, Self::Unclassified(_))
    }
}

impl From<TransportCondition> for SendError {
    fn from(condition: TransportCondition) -> Self {
        match condition {
            TransportCondition::CouldNotConnect(_) => Self::ConnectionFailed(condition),
            TransportCondition::TimedOut(_) => Self::ConnectionTimedOut(condition),
            TransportCondition::SslConnect(_) => Self::ConnectionSSLFailed(condition),
            TransportCondition::LoginDenied { .. } => Self::AuthenticationFailed(condition),
            TransportCondition::CouldNotResolveHost(_) => Self::UnableToResolveHost(condition),
            TransportCondition::CouldNotResolveProxy(_) => Self::UnableToResolveProxy(condition),
            TransportCondition::Send(_)
            | TransportCondition::Rejected {
                stage: Stage::MailFrom | Stage::RcptTo | Stage::Data,
                ..
            } => Self::UnableToSendData(condition),
            _ => Self::Unclassified(condition),
        }
    }
}
