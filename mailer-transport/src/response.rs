//! SMTP reply parsing.

use crate::TransportCondition;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The three digit reply code.
    pub code: u16,
    /// The text of each line, without code and separator.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All lines joined with a space.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. `354` after DATA or `334` during AUTH.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// The EHLO keywords, i.e. every line after the first.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().skip(1).map(String::as_str)
    }

    /// Whether the EHLO reply advertises `keyword` (case-insensitive).
    #[must_use]
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.extensions().any(|line| {
            line.split_ascii_whitespace()
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
        })
    }

    /// The SASL mechanisms listed by the `AUTH` extension, upper-cased.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.extensions()
            .filter_map(|line| {
                let mut words = line.split_ascii_whitespace();
                let keyword = words.next()?;
                // Some servers still announce the pre-standard `AUTH=PLAIN LOGIN` form.
                let rest = if keyword.eq_ignore_ascii_case("AUTH") {
                    None
                } else {
                    let (k, first) = keyword.split_once('=')?;
                    if !k.eq_ignore_ascii_case("AUTH") {
                        return None;
                    }
                    Some(first)
                };
                Some(
                    rest.into_iter()
                        .chain(words)
                        .map(str::to_ascii_uppercase)
                        .collect::<Vec<_>>(),
                )
            })
            .flatten()
            .collect()
    }

    /// Parses one complete reply from the front of `buffer`.
    ///
    /// Returns `Ok(None)` when more data is needed, otherwise the reply and the
    /// number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns [`TransportCondition::WeirdReply`] if a line is not of the form
    /// `NNN[ -]text`, or the lines of a multi-line reply disagree on the code.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, TransportCondition> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(eol) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + eol];
            consumed += eol + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(raw);

            let (line_code, is_last, text) = Self::parse_line(&line)?;
            match code {
                Some(expected) if expected != line_code => {
                    return Err(TransportCondition::WeirdReply(format!(
                        "reply code changed from {expected} to {line_code} mid-reply"
                    )));
                }
                _ => code = Some(line_code),
            }
            lines.push(text.to_string());

            if is_last {
                return Ok(Some((Self::new(line_code, lines), consumed)));
            }
        }

        Ok(None)
    }

    fn parse_line(line: &str) -> Result<(u16, bool, &str), TransportCondition> {
        let weird = || TransportCondition::WeirdReply(format!("'{line}'"));

        let digits = line.get(..3).ok_or_else(weird)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(weird());
        }
        let code = digits.parse::<u16>().map_err(|_| weird())?;

        match line.as_bytes().get(3) {
            None => Ok((code, true, "")),
            Some(b' ') => Ok((code, true, &line[4..])),
            Some(b'-') => Ok((code, false, &line[4..])),
            Some(_) => Err(weird()),
        }
    }
}
