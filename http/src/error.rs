//! Channel-level error types (§7). The channel never propagates an error to
//! its caller by panicking or returning from deep inside a callback — every
//! failure kind named in the spec's Error Handling Design ends up as one of
//! these variants, surfaced through a completion or an error listener.

use std::{fmt, io};

use crate::h1::proto::error::ProtoError;

/// Top level per-connection error. `SE` is the handler's error type, `BE`
/// the response body stream's error type — kept as parameters (rather than
/// boxed trait objects) the same way the teacher crate's `h1::error::Error`
/// does, so a caller that only ever returns `Infallible` pays nothing for
/// error handling machinery it doesn't use.
#[derive(Debug)]
pub enum Error<SE, BE> {
    Io(io::Error),
    Proto(ProtoError),
    Service(SE),
    Body(BE),
    /// The peer closed the connection; not an error worth logging.
    Closed,
    /// Idle/keep-alive timer fired with nothing in flight (waiting for a
    /// request head, either the first one or the next on a kept-alive
    /// connection).
    KeepAliveExpire,
    /// Idle timer fired mid-exchange: the handler and the wire both went
    /// quiet past `idle_timeout` with a request already in flight.
    Timeout,
}

impl<SE, BE> From<io::Error> for Error<SE, BE> {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl<SE, BE> From<ProtoError> for Error<SE, BE> {
    fn from(e: ProtoError) -> Self {
        Self::Proto(e)
    }
}

impl<SE: fmt::Display, BE: fmt::Display> fmt::Display for Error<SE, BE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Proto(e) => write!(f, "protocol error: {e}"),
            Self::Service(e) => write!(f, "handler error: {e}"),
            Self::Body(e) => write!(f, "body error: {e}"),
            Self::Closed => write!(f, "connection closed"),
            Self::KeepAliveExpire => write!(f, "keep-alive timer expired"),
            Self::Timeout => write!(f, "idle timeout"),
        }
    }
}

impl<SE: fmt::Debug + fmt::Display, BE: fmt::Debug + fmt::Display> std::error::Error for Error<SE, BE> {}

/// Failure kinds surfaced through the request-body content stream (error
/// chunks) or a response write completion, as opposed to connection-level
/// `Error` above.
#[derive(Debug, Clone)]
pub enum BodyError {
    Io(String),
    Framing(FramingError),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Framing(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BodyError {}

impl From<io::Error> for BodyError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Content-Length violations (§4.2/§4.4): declared length vs. what was
/// actually written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// More bytes have been written than the declared `Content-Length`
    /// allows — whether discovered by a write that overruns it or by
    /// `set_content_length` declaring a value below what's already written.
    TooMuchData { declared: u64, written: u64 },
    /// Handler closed the body (`last=true`) before reaching the declared
    /// `Content-Length`.
    TooLittleData { declared: u64, written: u64 },
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooMuchData { declared, written } => {
                write!(f, "content-length {declared} < {written}")
            }
            Self::TooLittleData { declared, written } => {
                write!(f, "content-length {declared} > {written}")
            }
        }
    }
}
