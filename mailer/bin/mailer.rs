//! Sends one e-mail, reading the body from standard input.
//!
//! ```text
//! echo "Hello" | mailer --to you@example.com --subject "Hi"
//! ```

use std::{io::Read, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use mailer::MailerConfig;

const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024;

/// Send an e-mail through the configured SMTP server
#[derive(Parser, Debug)]
#[command(name = "mailer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Recipient address
    #[arg(short, long)]
    to: String,

    /// Subject line
    #[arg(short, long, default_value = "")]
    subject: String,

    /// Configuration file (defaults to $MAILER_CONFIG, ./mailer.config.ron,
    /// then /etc/mailer/mailer.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Largest body accepted on standard input
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: u64,
}

fn main() -> anyhow::Result<()> {
    mailer::logging::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MailerConfig::from_file(path)?,
        None => MailerConfig::load()?,
    };
    let client = config.into_builder()?.build();

    let body = read_body(std::io::stdin().lock(), cli.max_body_bytes)?;
    anyhow::ensure!(!cli.to.is_empty(), "recipient must not be empty");
    anyhow::ensure!(!body.is_empty(), "message body is empty");

    mailer::initialize()?;
    let result = client.send(&cli.to, &cli.subject, &body);
    mailer::terminate()?;

    result.with_context(|| format!("Failed to send mail to {}", cli.to))?;
    println!("Mail sent to {}", cli.to);
    Ok(())
}

/// Reads all of `input`, failing instead of truncating when it is larger than
/// `limit` bytes.
fn read_body(input: impl Read, limit: u64) -> anyhow::Result<String> {
    let mut body = Vec::new();
    let read = input
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .context("Failed to read message body from stdin")?;

    anyhow::ensure!(
        u64::try_from(read).is_ok_and(|read| read <= limit),
        "message body exceeds {limit} bytes (use --max-body-bytes to raise the limit)"
    );
    String::from_utf8(body).context("Message body is not valid UTF-8")
}
