//! Deadlines for the phases of an SMTP submission.
//!
//! Any phase that runs past its deadline fails the submission with
//! [`TransportCondition::TimedOut`](crate::TransportCondition::TimedOut).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side SMTP timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmtpTimeouts {
    /// Resolving and connecting, including the proxy tunnel and TLS handshake.
    pub connect: Duration,
    /// Waiting for the reply to any single command.
    pub command: Duration,
    /// Writing the message and waiting for the reply to the final `.`.
    pub data: Duration,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(defaults::connect_secs()),
            command: Duration::from_secs(defaults::command_secs()),
            data: Duration::from_secs(defaults::data_secs()),
        }
    }
}

/// The serialisable form of [`SmtpTimeouts`], in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSecs {
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// Default: 120 seconds (2 minutes)
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,
}

impl Default for TimeoutSecs {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            command_secs: defaults::command_secs(),
            data_secs: defaults::data_secs(),
        }
    }
}

impl From<TimeoutSecs> for SmtpTimeouts {
    fn from(secs: TimeoutSecs) -> Self {
        Self {
            connect: Duration::from_secs(secs.connect_secs),
            command: Duration::from_secs(secs.command_secs),
            data: Duration::from_secs(secs.data_secs),
        }
    }
}

mod defaults {
    pub const fn connect_secs() -> u64 {
        30
    }
    pub const fn command_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        120 // 2 minutes
    }
}
