use std::io;

use bytes::{Buf, BufMut, BytesMut};

/// Read from a non-blocking, `std::io::Read`-style source directly into the
/// spare capacity of `buf`, growing it first if it is more than half full.
///
/// This mirrors `tokio_util::io::poll_read_buf` but works against a plain
/// synchronous `Read` impl (the dispatcher only calls this after an
/// `AsyncIo::ready(Interest::READABLE)` has already resolved, so the read
/// itself is expected to be non-blocking or to return `WouldBlock`).
///
/// # Safety
/// The written region is guaranteed initialized by `read()` up to the
/// reported `n`, so advancing `buf`'s length by exactly `n` never exposes
/// uninitialized memory.
pub fn read_buf<R: io::Read>(io: &mut R, buf: &mut BytesMut) -> io::Result<usize> {
    if buf.capacity() - buf.len() < 4096 {
        buf.reserve(4096);
    }

    let dst = buf.spare_capacity_mut();
    // SAFETY: `Read::read` only ever writes initialized bytes into the
    // prefix of the slice it returns through `n`; we only expose that
    // prefix below via `set_len`.
    let dst = unsafe { &mut *(dst as *mut [std::mem::MaybeUninit<u8>] as *mut [u8]) };

    let n = io.read(dst)?;
    // SAFETY: `n` bytes at the tail of `buf` were just initialized by `read`.
    unsafe { buf.advance_mut(n) };
    Ok(n)
}

/// Drain and return the fully-written portion of `buf` as a standalone
/// [`bytes::Bytes`], leaving `buf` empty and ready for reuse.
pub fn split_all(buf: &mut BytesMut) -> bytes::Bytes {
    buf.split().freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cursor<'a>(&'a [u8]);

    impl io::Read for Cursor<'_> {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = out.len().min(self.0.len());
            out[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn reads_into_spare_capacity() {
        let mut src = Cursor(b"hello world");
        let mut buf = BytesMut::new();
        let n = read_buf(&mut src, &mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf[..], b"hello world");
    }

    #[test]
    fn accumulates_across_calls() {
        let mut src = Cursor(b"abc");
        let mut buf = BytesMut::from(&b"xyz"[..]);
        read_buf(&mut src, &mut buf).unwrap();
        assert_eq!(&buf[..], b"xyzabc");
    }
}
