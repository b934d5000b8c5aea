//! Parse/framing failures from the HTTP/1 wire codec (§7 "Parse/framing"
//! error kind), kept separate from the connection-level [`crate::error::Error`]
//! the same way the teacher crate splits `h1::proto::error::ProtoError` out
//! from `h1::error::Error`.

use std::fmt;

#[derive(Debug)]
pub enum ProtoError {
    Parse(Parse),
    /// Response header/trailer encoding failed validation (e.g. a header
    /// value containing a bare `\r` or `\n`).
    InvalidHeaderValue,
}

#[derive(Debug)]
pub enum Parse {
    /// Request line or header block could not be parsed at all.
    Request,
    /// Header block exceeded `HEADER_LIMIT`.
    HeaderTooLarge,
    /// Malformed chunked-encoding framing in the request body.
    Chunk,
    /// `Content-Length` header was present but not a valid, single integer.
    ContentLength,
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(Parse::Request) => write!(f, "malformed request line or headers"),
            Self::Parse(Parse::HeaderTooLarge) => write!(f, "request header block too large"),
            Self::Parse(Parse::Chunk) => write!(f, "malformed chunked body"),
            Self::Parse(Parse::ContentLength) => write!(f, "malformed content-length header"),
            Self::InvalidHeaderValue => write!(f, "invalid response header value"),
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<httparse::Error> for ProtoError {
    fn from(_: httparse::Error) -> Self {
        Self::Parse(Parse::Request)
    }
}
