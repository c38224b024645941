//! Classification of raw channel payloads.

use std::fmt;

/// A channel message payload, classified for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Every byte is printable ASCII or `\t`, `\r`, `\n`.
    Text(String),
    /// Anything else; only the length is ever shown.
    Binary(usize),
}

impl Payload {
    /// Classifies `bytes`. A single trailing NUL, as sent by C clients, is
    /// not part of the payload.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        let body = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        if body.iter().copied().all(is_printable) {
            Self::Text(body.iter().copied().map(char::from).collect())
        } else {
            Self::Binary(bytes.len())
        }
    }

    /// The text, if the payload is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Binary(len) => write!(f, "<binary: {len} bytes>"),
        }
    }
}

/// Printable ASCII plus tab, carriage return and line feed.
#[must_use]
pub const fn is_printable(byte: u8) -> bool {
    matches!(byte, 32..=126 | b'\t' | b'\r' | b'\n')
}
