//! Newline-delimited text framing and the reserved heartbeat literals.

/// Literal sent by the client to probe liveness.
pub const PING: &str = "PING";
/// Literal the server answers a [`PING`] with.
pub const PONG: &str = "PONG";

/// One line of an inbound text payload.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// The heartbeat reply, consumed by the session and never forwarded
    Pong,
    /// Anything else, expected to hold a single JSON document
    Payload(&'a str),
}

impl<'a> Frame<'a> {
    fn classify(line: &'a str) -> Self {
        if line == PONG {
            Self::Pong
        } else {
            Self::Payload(line)
        }
    }
}

/// Split a text payload into frames, skipping empty lines.
///
/// A trailing `\r` is stripped so CRLF-terminated payloads route the same way.
pub fn split(text: &str) -> impl Iterator<Item = Frame<'_>> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(Frame::classify)
}
