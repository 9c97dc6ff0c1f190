//! Formatting of the message payload handed to the transport.

use std::borrow::Cow;

/// Builds the RFC 5322 style payload for a single message.
///
/// The header block holds exactly `From`, `To` and `Subject`, each terminated by
/// CRLF, followed by an empty line, the body verbatim, and a closing CRLF.
///
/// CR and LF inside header values are replaced with spaces so a value can never
/// start a new header line. The body is not touched.
///
/// # Panics
///
/// Panics if `sender`, `recipient` or `body` is empty.
///
/// ```
/// let payload = mailer::compose("a@x.com", "b@y.com", "Hi", "Hello\nWorld");
/// assert_eq!(
///     payload,
///     b"From: a@x.com\r\nTo: b@y.com\r\nSubject: Hi\r\n\r\nHello\nWorld\r\n"
/// );
/// ```
#[must_use]
pub fn compose(sender: &str, recipient: &str, subject: &str, body: &str) -> Vec<u8> {
    assert!(!sender.is_empty(), "sender must not be empty");
    assert!(!recipient.is_empty(), "recipient must not be empty");
    assert!(!body.is_empty(), "body must not be empty");

    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n{body}\r\n",
        header_value(sender),
        header_value(recipient),
        header_value(subject),
    )
    .into_bytes()
}

fn header_value(value: &str) -> Cow<'_, str> {
    if value.contains(['\r', '\n']) {
        Cow::Owned(value.replace(['\r', '\n'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
