//! Diagnostics for the library and the `mailer` binary.
//!
//! Events go to stderr so they never mix with anything a caller pipes from
//! stdout. Colour is only used when stderr is a terminal.

use std::{io::IsTerminal, str::FromStr};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

const LEVEL_ENV: &str = "LOG_LEVEL";

/// Installs the global subscriber.
///
/// The level comes from `LOG_LEVEL`, defaulting to TRACE in debug builds and
/// INFO otherwise. Only events from the `mailer` crates are shown.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let level = level(std::env::var(LEVEL_ENV).ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(std::io::stderr().is_terminal())
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("mailer")
                })),
        )
        .init();
}

fn level(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    let Some(value) = value else {
        return default;
    };

    LevelFilter::from_str(value).unwrap_or_else(|_| {
        eprintln!("Invalid log level specified {value}, defaulting to {default}");
        default
    })
}
