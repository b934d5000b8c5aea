//! Body-size bookkeeping shared between the handler-facing `Response`
//! write-side (§4.4) and the wire codec (§6), plus `Once` — a trivial
//! single-buffer body used for generated error/redirect responses the
//! channel itself produces (400, 404, 500), grounded in the teacher's
//! `body::{BodySize, Once}` pair referenced from `response::bad_request`.

use bytes::Bytes;

/// What the codec knows about a response body's length before the first
/// byte is handed to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySize {
    /// No body at all (e.g. 204/304, or a `write(last=true, buffers=[])`
    /// with no prior writes).
    None,
    /// Exactly `n` bytes will be written.
    Sized(u64),
    /// Length isn't known up front; frame with chunked encoding (HTTP/1.1)
    /// or connection-close (HTTP/1.0).
    Stream,
}

/// Something the wire codec can ask for a `BodySize`.
pub trait ResponseBody {
    fn size(&self) -> BodySize;
}

/// A response body that is exactly one buffer (or none), used for the
/// channel's own generated responses.
pub struct Once<T>(Option<T>);

impl<T> Once<T> {
    pub fn new(item: T) -> Self {
        Self(Some(item))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl ResponseBody for Once<Bytes> {
    fn size(&self) -> BodySize {
        match &self.0 {
            Some(b) if !b.is_empty() => BodySize::Sized(b.len() as u64),
            _ => BodySize::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_reports_sized_or_none() {
        assert_eq!(Once::new(Bytes::from_static(b"hi")).size(), BodySize::Sized(2));
        assert_eq!(Once::<Bytes>::empty().size(), BodySize::None);
    }
}
