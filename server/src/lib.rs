//! Minimal TCP accept loop handing each accepted connection to the
//! `chan-http` dispatcher (§1: "a pluggable acceptor is out of scope; a
//! reference one lives here"), grounded in the teacher's
//! `xitca-server::Builder`/`listen` shape (referenced from
//! `xitca-test::test_server`) but trimmed to the single-listener,
//! `AsyncIo`-only contract this spec calls for — no worker-thread pool, no
//! multi-protocol dispatch, no TLS. Those all stay outside this crate's
//! scope, composed in by whatever embeds it.

use std::{io, net::SocketAddr, sync::Arc};

use chan_http::{
    h1::{Dispatcher, ShutdownCoordinator, Stream, StreamWrapper},
    Date, Handler, HttpServiceConfig,
};
use chan_io::TcpStream;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

/// Binds one handler to one listening socket. `HEADER_LIMIT`/
/// `READ_BUF_LIMIT`/`WRITE_BUF_LIMIT` thread straight through to the
/// dispatcher's buffers, same as `chan_http::HttpServiceConfig`.
pub struct Server<H, const HEADER_LIMIT: usize = 64, const READ_BUF_LIMIT: usize = 262_144, const WRITE_BUF_LIMIT: usize = 262_144>
{
    handler: Arc<H>,
    config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    wrappers: Vec<StreamWrapper>,
}

impl<H, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    Server<H, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
where
    H: Handler + 'static,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            config: HttpServiceConfig::new(),
            wrappers: Vec::new(),
        }
    }

    pub fn config(mut self, config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>) -> Self {
        self.config = config;
        self
    }

    /// §4.5: install a stream-event observer (e.g. an access-log middleware)
    /// on every connection this server accepts from here on.
    pub fn stream_wrapper(mut self, wrapper: StreamWrapper) -> Self {
        self.wrappers.push(wrapper);
        self
    }

    /// Bind `addr` and spawn the accept loop. Returns immediately with a
    /// handle; the loop itself runs on the current `tokio` runtime.
    pub async fn bind(self, addr: impl tokio::net::ToSocketAddrs) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let stop_timeout = self.config.stop_timeout;
        let shutdown = ShutdownCoordinator::new();
        let date: Arc<dyn chan_http::DateTime> = Arc::new(Date::spawn());

        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handler = self.handler;
        let config = self.config;
        let wrappers = self.wrappers;
        let loop_shutdown = shutdown.clone();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = &mut stop_rx => break,

                    accepted = listener.accept() => {
                        let (socket, peer) = match accepted {
                            Ok(pair) => pair,
                            Err(e) => {
                                tracing::warn!(target: "chan_server", error = %e, "accept failed");
                                continue;
                            }
                        };

                        // §4.6 step 1: once stopping, refuse new work outright
                        // rather than accepting it only to close immediately.
                        if loop_shutdown.is_stopping() {
                            drop(socket);
                            continue;
                        }

                        let handler = handler.clone();
                        let date = date.clone();
                        let wrappers = wrappers.clone();
                        let guard = loop_shutdown.begin_exchange();
                        let connection_shutdown = loop_shutdown.clone();

                        tokio::spawn(async move {
                            let _guard = guard;
                            let io = TcpStream::new(socket);
                            let stream = Stream::new(io);
                            let mut dispatcher = Dispatcher::new(stream, &*handler, config)
                                .with_date(date)
                                .with_shutdown(connection_shutdown);
                            for wrapper in wrappers {
                                dispatcher.add_stream_wrapper(wrapper);
                            }
                            if let Err(e) = dispatcher.run().await {
                                tracing::debug!(target: "chan_server", %peer, error = %e, "connection ended");
                            }
                        });
                    }
                }
            }

            let stragglers = loop_shutdown.shutdown(stop_timeout).await;
            if stragglers > 0 {
                tracing::warn!(target: "chan_server", stragglers, "graceful shutdown deadline elapsed");
            }
        });

        Ok(ServerHandle {
            local_addr,
            stop: Some(stop_tx),
            join: Some(join),
            shutdown,
        })
    }
}

/// Handle to a running accept loop. Dropping this without calling
/// [`ServerHandle::stop`] leaves the loop running detached; `stop` is the
/// deliberate §4.6 shutdown path.
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
    shutdown: ShutdownCoordinator,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn in_flight_count(&self) -> usize {
        self.shutdown.in_flight_count()
    }

    /// §4.6: stop accepting new connections and wait for the accept loop
    /// (and its own drain wait) to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn hello(_req: &chan_http::Request, res: &mut chan_http::Response) -> Result<bool, chan_http::FramingError> {
        res.set_content_length(5)?;
        res.write(Bytes::from_static(b"hello"), true).await?;
        Ok(true)
    }

    #[tokio::test]
    async fn accepts_a_connection_and_answers_a_get() {
        let handle = Server::new(hello).bind("127.0.0.1:0").await.unwrap();
        let addr = handle.local_addr();

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("hello"));

        handle.stop().await;
    }
}
