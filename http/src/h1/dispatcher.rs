//! The per-connection driver loop (§2 "Data flow"), grounded in the
//! teacher's `Dispatcher::run` (`h1/proto/dispatcher.rs`) but restructured
//! around `async fn`s instead of a hand-rolled poll loop, since the rest of
//! this workspace already commits to `tokio` readiness IO rather than a
//! custom reactor.
//!
//! One call to [`Dispatcher::dispatch_one`] runs exactly one exchange to
//! completion: decode the request head, feed the request body from the
//! wire concurrently with the handler, drain the handler's response writes
//! to the wire, and report whether the connection stays open for another
//! exchange. [`Dispatcher::run`] loops that until the connection closes.

use std::sync::Arc;

use chan_io::AsyncIo;
use http::{HeaderValue, StatusCode, Version};
use tokio::sync::mpsc;

use crate::{
    body::request_body,
    config::HttpServiceConfig,
    date::DateTime,
    error::{BodyError, Error, FramingError},
    h1::{
        proto::{
            codec::TransferCoding,
            context::{content_length_of, ConnectionType, Context},
        },
        shutdown::ShutdownCoordinator,
        stream::{Stream, StreamWrapper},
    },
    handler::Handler,
    request::{ContentLength, Request},
    response::{Response, WriteOp},
};

type ChanError = Error<std::convert::Infallible, std::convert::Infallible>;

pub struct Dispatcher<'a, Io, H, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
{
    pub stream: Stream<Io, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    pub ctx: Context<HEADER_LIMIT>,
    pub handler: &'a H,
    pub config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    pub date: Option<Arc<dyn DateTime>>,
    pub shutdown: Option<ShutdownCoordinator>,
    exchanges: u64,
}

impl<'a, Io, H, const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    Dispatcher<'a, Io, H, HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
where
    Io: AsyncIo,
    H: Handler,
{
    pub fn new(
        stream: Stream<Io, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
        handler: &'a H,
        config: HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>,
    ) -> Self {
        Self {
            stream,
            ctx: Context::new(),
            handler,
            config,
            date: None,
            shutdown: None,
            exchanges: 0,
        }
    }

    pub fn with_date(mut self, date: Arc<dyn DateTime>) -> Self {
        self.date = Some(date);
        self
    }

    /// §4.6 step 2: once `coordinator` reports stopping, the next exchange
    /// on this connection is forced to `Connection: close` instead of
    /// pipelining another one, the way a brand-new accept already refuses
    /// outright (`chan-server`'s own `is_stopping` check).
    pub fn with_shutdown(mut self, coordinator: ShutdownCoordinator) -> Self {
        self.shutdown = Some(coordinator);
        self
    }

    /// §4.5 `add_stream_wrapper`: observe this connection's stream events
    /// for every exchange dispatched from here on.
    pub fn add_stream_wrapper(&mut self, wrapper: StreamWrapper) {
        self.stream.add_wrapper(wrapper);
    }

    /// Run exchanges off this connection until the peer or the protocol
    /// decides to close it (§6 "connection lifecycle").
    pub async fn run(&mut self) -> Result<(), ChanError> {
        loop {
            match self.dispatch_one().await {
                Ok(true) => {
                    self.exchanges += 1;
                    continue;
                }
                Ok(false) => return Ok(()),
                Err(Error::Closed | Error::KeepAliveExpire | Error::Timeout) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Returns `Ok(true)` if the connection should accept another exchange.
    pub async fn dispatch_one(&mut self) -> Result<bool, ChanError> {
        // §5 idle timer: the first request on a fresh connection gets
        // `idle_timeout` to arrive; a connection already kept alive for a
        // prior exchange gets the (typically shorter) `keep_alive_timeout`
        // to send its next one.
        let head_wait_timeout = if self.exchanges == 0 {
            self.config.idle_timeout
        } else {
            self.config.keep_alive_timeout
        };

        let head = loop {
            if let Some(head) = self.ctx.decode_head(self.stream.read_buf())? {
                break head;
            }
            match tokio::time::timeout(head_wait_timeout, self.stream.fill()).await {
                Ok(Ok(0)) => return Err(Error::Closed),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(Error::KeepAliveExpire),
            }
        };

        // §4.6 step 2: a connection already open when shutdown begins still
        // answers its next request, but with `Connection: close` and no
        // further pipelining, same as a brand-new accept is refused outright.
        if self.shutdown.as_ref().is_some_and(ShutdownCoordinator::is_stopping) {
            self.ctx.set_ctype(ConnectionType::Close);
        }

        let content_length = content_length_of(&head);
        let version = head.version();

        // §6 expect-100-continue: the spec times this to "the first read
        // demand from the application"; emitting it as soon as the head is
        // parsed is a deliberate simplification — it only differs
        // observably when a handler answers without ever reading the body,
        // in which case a 100 Continue the client didn't need is harmless.
        if self.ctx.is_expect_header() {
            self.ctx.encode_continue(self.stream.write_buf());
            self.stream.drain().await?;
        }

        let (tx, body) = request_body::channel();
        let mut in_coding = decoder_for(content_length);
        pump_once(&mut self.stream, &mut in_coding, &tx)?;

        let (parts, ()) = head.into_parts();
        let http_req = http::Request::from_parts(parts, body);
        let request = Request::new(http_req, content_length);

        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteOp>();
        let mut response = Response::new();
        response.bind_sink(write_tx, self.config.output_commit_threshold as u64);

        let mut out_coding = TransferCoding::Eof;
        let mut header_written = false;

        let mut handler_done: Option<Result<bool, FramingError>> = None;

        if !tx.is_eof() {
            self.stream.record_demand_content();
        }

        {
            let mut handler_fut = std::pin::pin!(self.handler.handle(&request, &mut response));

            loop {
                // `Response::write` awaits its own completion before returning
                // control to the handler, so by the time `handler_fut` resolves
                // every write it has actually sent has already been drained by
                // the `write_rx` arm below; at most its very last write is still
                // held back in `response` itself (see `Response::write`), and
                // that's flushed explicitly below once the loop exits.
                if handler_done.is_some() {
                    break;
                }

                tokio::select! {
                    biased;

                    done = &mut handler_fut, if handler_done.is_none() => {
                        handler_done = Some(done);
                    }

                    Some(op) = write_rx.recv() => {
                        self.apply_write(op, version, &mut out_coding, &mut header_written).await?;
                    }

                    fill = self.stream.fill(), if !tx.is_eof() => {
                        match fill {
                            Ok(0) => {
                                self.stream.record_read_content(None);
                                tx.feed_eof();
                            }
                            Ok(n) => {
                                self.stream.record_read_content(Some(n));
                                pump_once(&mut self.stream, &mut in_coding, &tx)?;
                            }
                            Err(e) => {
                                tx.feed_error(BodyError::from(e));
                            }
                        }
                    }

                    // §5 idle timer: re-armed every time this loop iterates, so
                    // any read/write/handler activity resets it. Fires when the
                    // handler and the wire both go quiet for too long mid-exchange.
                    _ = tokio::time::sleep(self.config.idle_timeout) => {
                        self.stream.failed(&"idle timeout");
                        return Err(Error::Timeout);
                    }
                }
            }
        }

        let mut force_close = false;

        match handler_done.take().expect("handler_fut resolved before the loop exits") {
            Ok(took) => {
                // flush a write the handler made last, still held back
                // pending a call that never came (see `Response::write`).
                if let Some((bytes, last, head)) = response.take_pending() {
                    let (completion, _rx) = tokio::sync::oneshot::channel();
                    self.apply_write(WriteOp { bytes, last, head, completion }, version, &mut out_coding, &mut header_written)
                        .await?;
                }

                if !header_written {
                    // §6: the handler never wrote anything. `false` means
                    // "not handled" — generate the default 404; a bare
                    // `true` with no writes is an empty 200.
                    let status = if took { response.status() } else { StatusCode::NOT_FOUND };
                    self.write_head(status, &response.effective_headers(), version, &mut out_coding).await?;
                }
            }
            Err(err) => {
                // §4.1/§8: record the failure on the stream regardless of
                // commit state.
                self.stream.failed(&err);
                if !header_written {
                    // §7: nothing reached the wire yet, so a clean 500 is
                    // still possible.
                    let (status, headers, _body) = Response::server_error(&err.to_string());
                    self.write_head(status, &headers, version, &mut out_coding).await?;
                } else {
                    // §7: already committed — nothing left to rewrite, log
                    // and tear the connection down instead.
                    tracing::warn!(
                        target: "chan_http::h1::dispatcher",
                        error = %err,
                        "framing violation after commit, closing connection"
                    );
                }
                force_close = true;
            }
        }

        // §7: the handler may have answered without reading the request
        // body to its end (or at all). Whatever's left has to come off the
        // wire before the next request head can be decoded out of the same
        // buffer; drain it up to `unconsumed_drain_limit` and force-close
        // instead of pipelining behind a body of unbounded remaining size.
        // `in_coding.is_eof()` bodies (no body, or none declared) have
        // nothing to drain regardless of whether the handler ever read.
        if !force_close && !in_coding.is_eof() && !tx.is_eof() {
            let mut drained = 0usize;
            loop {
                match in_coding.decode(self.stream.read_buf()) {
                    Ok(Some(bytes)) if bytes.is_empty() => break,
                    Ok(Some(bytes)) => {
                        drained += bytes.len();
                        if drained > self.config.unconsumed_drain_limit {
                            force_close = true;
                            break;
                        }
                    }
                    Ok(None) => match tokio::time::timeout(self.config.idle_timeout, self.stream.fill()).await {
                        Ok(Ok(0)) => break,
                        Ok(Ok(_)) => {}
                        Ok(Err(_)) | Err(_) => {
                            force_close = true;
                            break;
                        }
                    },
                    Err(_) => {
                        force_close = true;
                        break;
                    }
                }
            }
        }

        match response.take_trailers() {
            Some(supplier) => out_coding.encode_eof_with_trailers(&supplier(), self.stream.write_buf()),
            None => out_coding.encode_eof(self.stream.write_buf()),
        }
        self.stream.succeeded().await?;

        request.notify_completed();

        let keep_alive = !force_close && self.ctx.ctype() == ConnectionType::KeepAlive;
        Ok(keep_alive)
    }

    async fn write_head(
        &mut self,
        status: StatusCode,
        headers: &http::HeaderMap,
        version: Version,
        out_coding: &mut TransferCoding,
    ) -> Result<(), std::io::Error> {
        let mut headers = headers.clone();
        *out_coding = pick_response_coding(&headers, version);

        // §9 Open Question #2: HTTP/1.0 has no chunked fallback and this
        // write buffer is bounded, so an un-sized body can't actually stay
        // open regardless of what the request asked for — downgrade before
        // `encode_head` runs so the header it writes matches what
        // `dispatch_one`'s keep-alive decision will actually do.
        if version == Version::HTTP_10
            && self.ctx.ctype() == ConnectionType::KeepAlive
            && !matches!(out_coding, TransferCoding::Length(_))
        {
            self.ctx.set_ctype(ConnectionType::Close);
        }

        ensure_framing_header(&mut headers, out_coding);
        self.ctx.encode_head(
            status,
            &headers,
            version,
            self.config.send_server_header,
            self.date.as_deref().filter(|_| self.config.send_date_header),
            self.stream.write_buf(),
        );
        let head_bytes = self.stream.write_buf().take();
        self.stream.send(head_bytes, false).await
    }

    async fn apply_write(
        &mut self,
        op: WriteOp,
        version: Version,
        out_coding: &mut TransferCoding,
        header_written: &mut bool,
    ) -> Result<(), std::io::Error> {
        if let Some((status, headers)) = op.head {
            self.write_head(status, &headers, version, out_coding).await?;
            *header_written = true;
        }

        let result = if op.bytes.is_empty() {
            Ok(())
        } else {
            out_coding
                .encode(op.bytes, self.stream.write_buf())
                .map_err(|_| std::io::Error::other("response framing error"))
        };

        let sent = match &result {
            Ok(()) => {
                let bytes = self.stream.write_buf().take();
                self.stream.send(bytes, op.last).await
            }
            Err(_) => Ok(()),
        };

        let _ = op.completion.send(result.and(sent));
        Ok(())
    }
}

fn decoder_for(content_length: ContentLength) -> TransferCoding {
    match content_length {
        ContentLength::Fixed(0) => TransferCoding::Eof,
        ContentLength::Fixed(n) => TransferCoding::Length(n),
        ContentLength::Chunked => TransferCoding::Chunked(Default::default()),
        ContentLength::Unknown => TransferCoding::Eof,
    }
}

/// §6: explicit `Content-Length` wins; otherwise HTTP/1.1 switches to
/// chunked on first flush and HTTP/1.0 falls back to connection-close
/// (§9's resolved Open Question: no chunked fallback pre-1.1).
fn pick_response_coding(headers: &http::HeaderMap, version: Version) -> TransferCoding {
    if let Some(value) = headers.get(http::header::CONTENT_LENGTH) {
        if let Ok(n) = value.to_str().unwrap_or("").trim().parse::<u64>() {
            return TransferCoding::Length(n);
        }
    }
    if version == Version::HTTP_10 {
        TransferCoding::Close
    } else {
        TransferCoding::Chunked(Default::default())
    }
}

fn ensure_framing_header(headers: &mut http::HeaderMap, coding: &TransferCoding) {
    if headers.contains_key(http::header::CONTENT_LENGTH) || headers.contains_key(http::header::TRANSFER_ENCODING) {
        return;
    }
    if matches!(coding, TransferCoding::Chunked(_)) {
        headers.insert(http::header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    }
}

/// Decode as many complete body chunks as are already sitting in the read
/// buffer and feed them to the request body channel. Called once right
/// after the head is parsed (bytes can arrive packed onto the same
/// `try_read` as the header) and again every time more bytes land.
fn pump_once<Io: AsyncIo, const R: usize, const W: usize>(
    stream: &mut Stream<Io, R, W>,
    decoder: &mut TransferCoding,
    tx: &request_body::RequestBodySender,
) -> Result<(), ChanError> {
    loop {
        match decoder.decode(stream.read_buf()) {
            Ok(Some(bytes)) if bytes.is_empty() => {
                tx.feed_eof();
                return Ok(());
            }
            Ok(Some(bytes)) => tx.feed_data(bytes),
            Ok(None) => return Ok(()),
            Err(e) => {
                let err: ChanError = e.into();
                tx.feed_error(BodyError::Io(err.to_string()));
                return Err(err);
            }
        }
    }
}
