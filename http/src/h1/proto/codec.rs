//! Wire framing (§6 "body framed by Content-Length, chunked transfer
//! encoding, or connection-close") as a single `TransferCoding` type used on
//! both sides of an exchange — as the request body's *decoder* and as the
//! response body's *encoder* — grounded in the teacher dispatcher's
//! `TransferCoding`/`DecodeState` (`super::codec::TransferCoding` and the
//! `decode`/`encode`/`encode_eof` calls in `h1/proto/dispatcher.rs`).

use bytes::{Bytes, BytesMut};
use http::HeaderMap;

use crate::h1::proto::{
    buf::BufWrite,
    error::{Parse, ProtoError},
};

/// One HTTP/1 body framing strategy, carrying whatever counters/parse state
/// that strategy needs.
#[derive(Debug)]
pub enum TransferCoding {
    /// No body at all (HEAD responses, 204/304, zero-length requests).
    Eof,
    /// `Content-Length: N`. For decode, `remaining` counts bytes still to
    /// be read off the wire. For encode, `remaining` counts bytes still
    /// permitted to be written before the response would exceed N.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked(ChunkedDecoder),
    /// No framing marker; body ends when the connection closes (HTTP/1.0
    /// fallback, or a drained-but-undersized keep-alive violation).
    Close,
    /// `Upgrade` connection: raw bytes pass through untouched in both
    /// directions and there is no EOF condition.
    Upgrade,
}

impl TransferCoding {
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::Upgrade)
    }

    /// Decode as many complete body chunks as `src` currently holds.
    /// `Ok(None)` means "need more bytes"; `Ok(Some(bytes))` with an empty
    /// `bytes` means the body just reached EOF.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtoError> {
        match self {
            Self::Eof | Self::Upgrade => Ok(None),
            Self::Length(remaining) => {
                if *remaining == 0 {
                    return Ok(Some(Bytes::new()));
                }
                if src.is_empty() {
                    return Ok(None);
                }
                let take = (*remaining as usize).min(src.len());
                let bytes = src.split_to(take).freeze();
                *remaining -= take as u64;
                Ok(Some(bytes))
            }
            Self::Close => {
                if src.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(src.split().freeze()))
                }
            }
            Self::Chunked(state) => state.decode(src),
        }
    }

    /// Frame one body write for the wire.
    pub fn encode(&mut self, bytes: Bytes, dst: &mut impl BufWrite) -> Result<(), ProtoError> {
        match self {
            Self::Eof => Ok(()),
            Self::Length(remaining) => {
                if bytes.len() as u64 > *remaining {
                    return Err(ProtoError::InvalidHeaderValue);
                }
                *remaining -= bytes.len() as u64;
                dst.buffer(&bytes);
                Ok(())
            }
            Self::Close | Self::Upgrade => {
                dst.buffer(&bytes);
                Ok(())
            }
            Self::Chunked(_) => {
                let mut size = itoa::Buffer::new();
                dst.buffer(size.format(bytes.len()).as_bytes());
                dst.buffer(b"\r\n");
                dst.buffer(&bytes);
                dst.buffer(b"\r\n");
                Ok(())
            }
        }
    }

    /// Finish the body: for chunked, emit the terminating `0\r\n\r\n` (plus
    /// trailers if any); for the other strategies this is a no-op on the
    /// wire, the caller just stops writing.
    pub fn encode_eof(&mut self, dst: &mut impl BufWrite) {
        if let Self::Chunked(_) = self {
            dst.buffer(b"0\r\n\r\n");
        }
    }

    pub fn encode_eof_with_trailers(&mut self, trailers: &HeaderMap, dst: &mut impl BufWrite) {
        if let Self::Chunked(_) = self {
            dst.buffer(b"0\r\n");
            for (name, value) in trailers {
                dst.buffer(name.as_str().as_bytes());
                dst.buffer(b": ");
                dst.buffer(value.as_bytes());
                dst.buffer(b"\r\n");
            }
            dst.buffer(b"\r\n");
        }
    }
}

/// Incremental chunked-transfer-encoding request body decoder.
#[derive(Debug, Default)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    #[default]
    Size,
    Body(u64),
    Done,
}

impl ChunkedDecoder {
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtoError> {
        loop {
            match self.state {
                ChunkedState::Done => return Ok(Some(Bytes::new())),
                ChunkedState::Size => {
                    let Some(line_end) = find_crlf(src) else {
                        return Ok(None);
                    };
                    let line = &src[..line_end];
                    // ignore chunk extensions after ';'
                    let size_str = line.split(|&b| b == b';').next().unwrap_or(line);
                    let size_str =
                        std::str::from_utf8(size_str).map_err(|_| ProtoError::Parse(Parse::Chunk))?;
                    let size = u64::from_str_radix(size_str.trim(), 16)
                        .map_err(|_| ProtoError::Parse(Parse::Chunk))?;
                    src.advance_to(line_end + 2);

                    if size == 0 {
                        // consume trailer section (no trailer headers supported
                        // inline here; a blank CRLF line ends it).
                        if let Some(trailer_end) = find_crlf(src) {
                            if trailer_end == 0 {
                                src.advance_to(2);
                                self.state = ChunkedState::Done;
                                return Ok(Some(Bytes::new()));
                            }
                        }
                        self.state = ChunkedState::Done;
                        return Ok(Some(Bytes::new()));
                    }
                    self.state = ChunkedState::Body(size);
                }
                ChunkedState::Body(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = (remaining as usize).min(src.len());
                    let bytes = src.split_to(take);
                    let left = remaining - take as u64;
                    if left == 0 {
                        // need the trailing CRLF after the chunk body before
                        // the next size line; tolerate it not having arrived
                        // yet by re-entering Size once it has.
                        if src.len() >= 2 {
                            src.advance_to(2);
                            self.state = ChunkedState::Size;
                        } else if src.is_empty() {
                            self.state = ChunkedState::Size;
                        } else {
                            // a single stray byte: wait for more.
                            self.state = ChunkedState::Body(0);
                        }
                    } else {
                        self.state = ChunkedState::Body(left);
                    }
                    return Ok(Some(bytes.freeze()));
                }
            }
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

trait AdvanceTo {
    fn advance_to(&mut self, n: usize);
}

impl AdvanceTo for BytesMut {
    fn advance_to(&mut self, n: usize) {
        let _ = self.split_to(n.min(self.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_decode_counts_down_and_signals_eof() {
        let mut coder = TransferCoding::Length(5);
        let mut buf = BytesMut::from(&b"hello"[..]);
        let chunk = coder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&chunk[..], b"hello");
        let eof = coder.decode(&mut buf).unwrap().unwrap();
        assert!(eof.is_empty());
    }

    #[test]
    fn length_encode_rejects_overflow() {
        let mut coder = TransferCoding::Length(3);
        let mut buf = crate::h1::proto::buf::FlatBuf::<64>::new();
        assert!(coder.encode(Bytes::from_static(b"ab"), &mut buf).is_ok());
        assert!(coder.encode(Bytes::from_static(b"cd"), &mut buf).is_err());
    }

    #[test]
    fn chunked_decode_splits_on_chunk_boundaries() {
        let mut coder = TransferCoding::Chunked(ChunkedDecoder::default());
        let mut buf = BytesMut::from(&b"5\r\nECHO \r\n4\r\nEcho\r\n0\r\n\r\n"[..]);

        let a = coder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&a[..], b"ECHO ");
        let b = coder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&b[..], b"Echo");
        let eof = coder.decode(&mut buf).unwrap().unwrap();
        assert!(eof.is_empty());
    }

    #[test]
    fn chunked_encode_wraps_each_write_and_terminates() {
        let mut coder = TransferCoding::Chunked(ChunkedDecoder::default());
        let mut buf = crate::h1::proto::buf::FlatBuf::<1024>::new();
        coder.encode(Bytes::from_static(b"ECHO "), &mut buf).unwrap();
        coder.encode(Bytes::from_static(b"Echo "), &mut buf).unwrap();
        coder.encode(Bytes::from_static(b"echo"), &mut buf).unwrap();
        coder.encode_eof(&mut buf);

        assert_eq!(
            buf.as_slice(),
            b"5\r\nECHO \r\n5\r\nEcho \r\n4\r\necho\r\n0\r\n\r\n".as_slice()
        );
    }
}
