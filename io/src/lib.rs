//! The channel's entire view of the network: a narrow, readiness-based IO
//! trait. TCP accept/selector plumbing and TLS termination are explicitly
//! out of scope (see spec §1) — this crate only defines the contract a
//! connected stream must satisfy, plus a `tokio::net::TcpStream` adapter so
//! the rest of the workspace has something concrete to run against.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

pub use tokio::io::{Interest, Ready};

/// The contract the dispatcher (`chan-http`) needs from a connected byte
/// stream: non-blocking reads/writes gated by readiness notification, plus
/// a shutdown hook for connection-close framing.
///
/// Implementors are expected to be cheap, `Unpin` handles (a TCP socket, a
/// TLS session wrapping one) — the trait itself never blocks.
pub trait AsyncIo: io::Read + io::Write + Unpin {
    /// Wait until at least one of `interest`'s readable/writable bits is
    /// satisfied, returning which one(s) actually are.
    fn ready(&self, interest: Interest) -> impl std::future::Future<Output = io::Result<Ready>> + Send;

    /// Whether `write` accepts a vectored buffer list without copying it
    /// down to a single contiguous slice first. Streams that can't support
    /// this (e.g. some TLS wrappers) should leave the default.
    fn is_vectored_write(&self) -> bool {
        false
    }

    /// Half-close the write side of the connection as part of `Connection:
    /// close` framing.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

/// Adapter over [`tokio::net::TcpStream`] implementing [`AsyncIo`].
pub struct TcpStream(tokio::net::TcpStream);

impl TcpStream {
    pub fn new(stream: tokio::net::TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self(stream)
    }

    pub fn into_inner(self) -> tokio::net::TcpStream {
        self.0
    }
}

impl io::Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl io::Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn write_vectored(&mut self, bufs: &[io::IoSlice<'_>]) -> io::Result<usize> {
        self.0.try_write_vectored(bufs)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncIo for TcpStream {
    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        self.0.ready(interest).await
    }

    fn is_vectored_write(&self) -> bool {
        true
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        use tokio::io::AsyncWrite;
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream as TokioTcpStream};

    #[tokio::test]
    async fn wraps_real_socket_and_is_readable_after_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TokioTcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let mut client = TcpStream::new(client);
        let mut server = TcpStream::new(server);

        use std::io::Write;
        client.write_all(b"hi").unwrap();

        server.ready(Interest::READABLE).await.unwrap();

        use std::io::Read;
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }
}
