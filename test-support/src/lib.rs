//! In-memory duplex-socket harness, grounded in `xitca-test::test_server`'s
//! role (spin up a real exchange without a real `TcpListener`) but adapted
//! from a bound TCP socket to an in-process [`chan_io::AsyncIo`] pair, since
//! the §8 scenarios this crate exists to drive don't need an actual port.
//!
//! [`duplex`] hands back two ends of one connection: wire one into
//! [`chan_http::h1::Stream`]/[`chan_http::h1::Dispatcher`] as the server
//! side, drive the other directly from test code as the client.

use std::{
    collections::VecDeque,
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use chan_io::{AsyncIo, Interest, Ready};
use tokio::sync::Notify;

struct Pipe {
    queue: Mutex<VecDeque<u8>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Pipe {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }
}

/// One end of an in-memory duplex connection. Reads pull from the peer's
/// writes; dropping an end marks it closed so the peer observes EOF once
/// its backlog drains, the same as a dropped `TcpStream`.
pub struct DuplexIo {
    read_pipe: Arc<Pipe>,
    write_pipe: Arc<Pipe>,
}

/// Connect two [`DuplexIo`] ends to each other.
pub fn duplex() -> (DuplexIo, DuplexIo) {
    let a_to_b = Arc::new(Pipe::new());
    let b_to_a = Arc::new(Pipe::new());
    (
        DuplexIo {
            read_pipe: b_to_a.clone(),
            write_pipe: a_to_b.clone(),
        },
        DuplexIo {
            read_pipe: a_to_b,
            write_pipe: b_to_a,
        },
    )
}

impl Drop for DuplexIo {
    fn drop(&mut self) {
        self.write_pipe.closed.store(true, Ordering::Release);
        self.write_pipe.notify.notify_waiters();
    }
}

impl io::Read for DuplexIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.read_pipe.queue.lock().unwrap();
        if queue.is_empty() {
            if self.read_pipe.closed.load(Ordering::Acquire) {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(queue.len());
        for slot in buf.iter_mut().take(n) {
            *slot = queue.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl io::Write for DuplexIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_pipe.queue.lock().unwrap().extend(buf.iter().copied());
        self.write_pipe.notify.notify_waiters();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncIo for DuplexIo {
    async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        if interest.is_writable() {
            return Ok(Ready::WRITABLE);
        }
        loop {
            {
                let queue = self.read_pipe.queue.lock().unwrap();
                if !queue.is_empty() || self.read_pipe.closed.load(Ordering::Acquire) {
                    return Ok(Ready::READABLE);
                }
            }
            self.read_pipe.notify.notified().await;
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.write_pipe.closed.store(true, Ordering::Release);
        self.write_pipe.notify.notify_waiters();
        Poll::Ready(Ok(()))
    }
}

impl DuplexIo {
    /// Block (async) until at least one byte is available or the peer has
    /// closed, then hand back whatever's queued.
    pub async fn read_available(&mut self) -> io::Result<Vec<u8>> {
        self.ready(Interest::READABLE).await?;
        let mut queue = self.read_pipe.queue.lock().unwrap();
        Ok(queue.drain(..).collect())
    }

    /// Read until the peer closes (or half-closes via `poll_shutdown`),
    /// accumulating everything sent.
    pub async fn read_to_close(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            self.ready(Interest::READABLE).await?;
            let mut queue = self.read_pipe.queue.lock().unwrap();
            if queue.is_empty() && self.read_pipe.closed.load(Ordering::Acquire) {
                return Ok(out);
            }
            out.extend(queue.drain(..));
        }
    }

    pub fn write_now(&mut self, bytes: &[u8]) {
        use io::Write;
        self.write_all(bytes).expect("duplex write never blocks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chan_http::{
        config::HttpServiceConfig,
        h1::{Dispatcher, Stream},
        response::Response,
        Request,
    };

    async fn echo_status(_req: &Request, res: &mut Response) -> Result<bool, chan_http::FramingError> {
        res.set_content_length(2)?;
        res.write(bytes::Bytes::from_static(b"ok"), true).await?;
        Ok(true)
    }

    #[tokio::test]
    async fn drives_one_exchange_over_an_in_memory_duplex() {
        let (server_io, mut client_io) = duplex();

        client_io.write_now(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n");

        let handler = echo_status;
        let stream = Stream::<_, 4096, 4096>::new(server_io);
        let config = HttpServiceConfig::<64, 4096, 4096>::new();
        tokio::spawn(async move {
            let mut dispatcher = Dispatcher::new(stream, &handler, config);
            let _ = dispatcher.run().await;
        });

        let response = client_io.read_to_close().await.unwrap();
        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("ok"));
    }
}
