//! §4.1 Stream — the channel's adapter over the connection, grounded in the
//! teacher dispatcher's `BufferedIo` (`try_read`/`try_write`/`drain_write`
//! loops against `xitca_io::io::AsyncIo` in `h1/proto/dispatcher.rs`).
//!
//! Unlike the teacher, which threads everything through one big
//! `Dispatcher::run` loop, this Stream exposes `fill`/`drain` as ordinary
//! `async fn`s: under `tokio`, awaiting a write *is* the completion
//! notification from §4.1 ("`completion` is invoked once ... ordering
//! preserved"), so there is no separate completion-callback type to
//! maintain here — the dispatcher in `h1::dispatcher` `.await`s each send in
//! the order it issues them, which is exactly FIFO completion order.

use std::sync::Arc;

use bytes::{Buf, Bytes};
use chan_io::AsyncIo;
use chan_unsafe_collection::bytes::read_buf;

use crate::h1::proto::buf::{BufInterest, BufWrite, FlatBuf, ReadBuf};

/// Events a stream wrapper (§4.5 `add_stream_wrapper`) can observe, in the
/// order they occur for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ReadContent(Option<usize>),
    DemandContent,
    Send { len: usize, last: bool },
    Succeeded,
    Failed(String),
}

/// `Arc` rather than `Box` so a server can install the same wrapper (e.g. a
/// logging middleware) on every accepted connection without re-allocating it
/// per connection (`chan-server`'s `Server::stream_wrapper`).
pub type StreamWrapper = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Byte-level adapter over one accepted connection, parameterized the same
/// way as [`crate::config::HttpServiceConfig`] so its buffers are sized at
/// compile time.
pub struct Stream<Io, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize> {
    io: Io,
    read_buf: ReadBuf<READ_BUF_LIMIT>,
    write_buf: FlatBuf<WRITE_BUF_LIMIT>,
    wrappers: Vec<StreamWrapper>,
    aborted: bool,
}

impl<Io, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    Stream<Io, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
where
    Io: AsyncIo,
{
    pub fn new(io: Io) -> Self {
        Self {
            io,
            read_buf: ReadBuf::new(),
            write_buf: FlatBuf::new(),
            wrappers: Vec::new(),
            aborted: false,
        }
    }

    /// §4.5 `add_stream_wrapper`: register an observer of this connection's
    /// stream events. `h1::dispatcher::Dispatcher::add_stream_wrapper` is
    /// the caller-facing entry point (`chan-server`'s `Server::stream_wrapper`
    /// installs one on every accepted connection).
    pub fn add_wrapper(&mut self, wrapper: StreamWrapper) {
        self.wrappers.push(wrapper);
    }

    fn emit(&self, event: StreamEvent) {
        for wrapper in &self.wrappers {
            wrapper(&event);
        }
    }

    pub fn read_buf(&mut self) -> &mut ReadBuf<READ_BUF_LIMIT> {
        &mut self.read_buf
    }

    pub fn write_buf(&mut self) -> &mut FlatBuf<WRITE_BUF_LIMIT> {
        &mut self.write_buf
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Pull whatever bytes are currently available off the wire into the
    /// read buffer, looping on `try_read`/readiness until `WouldBlock`
    /// (grounded in the teacher's `BufferedIo::try_read`).
    pub async fn fill(&mut self) -> std::io::Result<usize> {
        let mut total = 0;
        loop {
            if self.read_buf.backpressure() {
                return Ok(total);
            }
            match read_buf(&mut self.io, &mut self.read_buf) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if total > 0 {
                        return Ok(total);
                    }
                    self.io.ready(chan_io::Interest::READABLE).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drain the write buffer to the wire, looping on `try_write`/readiness
    /// until empty or `WouldBlock`.
    pub async fn drain(&mut self) -> std::io::Result<()> {
        use std::io::Write;

        while self.write_buf.want_write() {
            match self.io.write(self.write_buf.as_slice()) {
                Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
                Ok(n) => self.write_buf.advance(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.io.ready(chan_io::Interest::WRITABLE).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// §4.1 `send`: buffer `bytes` for the wire and drain immediately,
    /// notifying wrappers in `read_content`/`demand_content`/`send` order.
    /// The `await` resolving is the single FIFO completion §4.1 requires.
    pub async fn send(&mut self, bytes: Bytes, last: bool) -> std::io::Result<()> {
        self.write_buf.buffer(&bytes);
        let result = self.drain().await;
        self.emit(StreamEvent::Send {
            len: bytes.len(),
            last,
        });
        result
    }

    pub async fn succeeded(&mut self) -> std::io::Result<()> {
        let result = self.drain().await;
        self.emit(StreamEvent::Succeeded);
        result
    }

    pub fn failed(&mut self, cause: &dyn std::fmt::Display) {
        self.aborted = true;
        self.emit(StreamEvent::Failed(cause.to_string()));
    }

    /// §4.1 `abort`: force-terminate; reads now fail, sends now fail their
    /// completion.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn record_read_content(&self, len: Option<usize>) {
        self.emit(StreamEvent::ReadContent(len));
    }

    pub fn record_demand_content(&self) {
        self.emit(StreamEvent::DemandContent);
    }

    pub fn into_inner(self) -> Io {
        self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{self, Read, Write},
        pin::Pin,
        sync::{Arc, Mutex},
        task::{Context, Poll},
    };

    /// An always-ready in-memory duplex used to exercise `Stream` without a
    /// real socket.
    struct MemIo {
        inbound: io::Cursor<Vec<u8>>,
        outbound: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for MemIo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inbound.read(buf)
        }
    }

    impl Write for MemIo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.outbound.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AsyncIo for MemIo {
        async fn ready(&self, interest: chan_io::Interest) -> io::Result<chan_io::Ready> {
            Ok(if interest.is_readable() {
                chan_io::Ready::READABLE
            } else {
                chan_io::Ready::WRITABLE
            })
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn send_drains_to_outbound_buffer() {
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let io = MemIo {
            inbound: io::Cursor::new(Vec::new()),
            outbound: outbound.clone(),
        };
        let mut stream = Stream::<_, 4096, 4096>::new(io);
        stream.send(Bytes::from_static(b"hello"), true).await.unwrap();
        assert_eq!(&outbound.lock().unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn wrappers_observe_events_in_order() {
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let io = MemIo {
            inbound: io::Cursor::new(Vec::new()),
            outbound,
        };
        let mut stream = Stream::<_, 4096, 4096>::new(io);
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        stream.add_wrapper(Arc::new(move |ev: &StreamEvent| e.lock().unwrap().push(ev.clone())));

        stream.record_demand_content();
        stream.send(Bytes::from_static(b"x"), false).await.unwrap();
        stream.succeeded().await.unwrap();

        let recorded = events.lock().unwrap();
        assert_eq!(
            &*recorded,
            &[
                StreamEvent::DemandContent,
                StreamEvent::Send { len: 1, last: false },
                StreamEvent::Succeeded,
            ]
        );
    }

    #[tokio::test]
    async fn fill_reads_available_inbound_bytes() {
        let io = MemIo {
            inbound: io::Cursor::new(b"GET / HTTP/1.1\r\n\r\n".to_vec()),
            outbound: Arc::new(Mutex::new(Vec::new())),
        };
        let mut stream = Stream::<_, 4096, 4096>::new(io);
        let n = stream.fill().await.unwrap();
        assert_eq!(n, 19);
        assert_eq!(&stream.read_buf()[..], b"GET / HTTP/1.1\r\n\r\n");
    }
}
