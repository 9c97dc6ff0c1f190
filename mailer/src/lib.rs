//! A minimal e-mail sending client.
//!
//! A [`Builder`] collects the server URL, sender identity, optional
//! credentials and the SSL flag, then freezes them into a [`Client`]. Each
//! [`Client::send`] composes one message, hands it to a
//! [`Transport`](mailer_transport::Transport) and classifies any failure as a
//! [`SendError`].
//!
//! ```no_run
//! use mailer::{Builder, SendError};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mailer::initialize()?;
//!
//!     let client = Builder::new("smtp://smtp.example.com:587", "me@example.com")
//!         .ssl(true)
//!         .auth("me", "secret")
//!         .build();
//!
//!     match client.send("you@example.com", "Hello", "Hi there!") {
//!         Ok(()) => println!("sent"),
//!         Err(SendError::AuthenticationFailed(_)) => eprintln!("check the password"),
//!         Err(e) => eprintln!("{e}"),
//!     }
//!
//!     mailer::terminate()?;
//!     Ok(())
//! }
//! ```

mod builder;
mod client;
mod composer;
pub mod config;
mod error;
mod lifecycle;
pub mod logging;

pub use builder::Builder;
pub use client::Client;
pub use composer::compose;
pub use config::{ConfigError, MailerConfig};
pub use error::SendError;
pub use lifecycle::{LifecycleError, initialize, is_initialized, terminate};
pub use mailer_transport as transport;
pub use mailer_transport::{SmtpTimeouts, SmtpTransport, TransportCondition};
