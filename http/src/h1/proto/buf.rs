//! Growable write buffer with a backpressure threshold, grounded in the
//! teacher dispatcher's `FlatBuf`/`BufWrite` pair (`super::buf::{BufInterest,
//! BufWrite, FlatBuf}` in `h1/proto/dispatcher.rs`). `WRITE_BUF_LIMIT` is the
//! response-buffer-size configurable (§6); once the buffer holds that many
//! unflushed bytes, the dispatcher treats the connection as write-blocked.

use std::ops::{Deref, DerefMut};

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Shared behavior both the flat and (potentially) vectored write buffer
/// expose to the dispatcher.
pub trait BufInterest {
    fn backpressure(&self) -> bool;
    fn want_write(&self) -> bool;
}

/// Buffer the dispatcher writes encoded response bytes into before an
/// `AsyncIo::write` call drains it.
pub trait BufWrite: BufInterest {
    fn buffer(&mut self, bytes: &[u8]);
}

/// A single contiguous growable buffer, backpressured at `WRITE_BUF_LIMIT`
/// bytes.
pub struct FlatBuf<const WRITE_BUF_LIMIT: usize> {
    buf: BytesMut,
}

impl<const WRITE_BUF_LIMIT: usize> Default for FlatBuf<WRITE_BUF_LIMIT> {
    fn default() -> Self {
        Self { buf: BytesMut::new() }
    }
}

impl<const WRITE_BUF_LIMIT: usize> FlatBuf<WRITE_BUF_LIMIT> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, n: usize) {
        self.buf.advance(n);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Take everything buffered so far as a standalone `Bytes`, leaving the
    /// buffer empty. Used to hand encoded response bytes to `Stream::send`
    /// without a second copy.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl<const WRITE_BUF_LIMIT: usize> Deref for FlatBuf<WRITE_BUF_LIMIT> {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl<const WRITE_BUF_LIMIT: usize> DerefMut for FlatBuf<WRITE_BUF_LIMIT> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl<const WRITE_BUF_LIMIT: usize> BufInterest for FlatBuf<WRITE_BUF_LIMIT> {
    fn backpressure(&self) -> bool {
        self.buf.len() >= WRITE_BUF_LIMIT
    }

    fn want_write(&self) -> bool {
        !self.buf.is_empty()
    }
}

impl<const WRITE_BUF_LIMIT: usize> BufWrite for FlatBuf<WRITE_BUF_LIMIT> {
    fn buffer(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }
}

/// A read buffer shares the same growth/backpressure shape as the write
/// buffer; kept as a type alias so `decode_head`/body decoders read
/// naturally (`&mut read_buf` vs. `&mut write_buf`).
pub type ReadBuf<const READ_BUF_LIMIT: usize> = FlatBuf<READ_BUF_LIMIT>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_trips_at_limit() {
        let mut buf = FlatBuf::<4>::new();
        assert!(!buf.backpressure());
        buf.buffer(b"abcd");
        assert!(buf.backpressure());
    }

    #[test]
    fn take_empties_the_buffer_and_returns_its_bytes() {
        let mut buf = FlatBuf::<1024>::new();
        buf.buffer(b"abc");
        assert_eq!(&buf.take()[..], b"abc");
        assert!(!buf.want_write());
    }

    #[test]
    fn want_write_reflects_pending_bytes() {
        let mut buf = FlatBuf::<1024>::new();
        assert!(!buf.want_write());
        buf.buffer(b"x");
        assert!(buf.want_write());
        buf.advance(1);
        assert!(!buf.want_write());
    }
}
