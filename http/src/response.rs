//! §4.4 Response write-side. `Response` itself does no IO — it is the
//! bookkeeping/validation object the handler manipulates; the dispatcher
//! (`h1::dispatcher`) turns its accumulated state into wire bytes through
//! `Stream::send`. Keeping IO out of this type is what lets commit and
//! content-length enforcement be plain synchronous logic, unit-testable
//! without a socket.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::sync::{mpsc, oneshot};

use crate::error::FramingError;

/// One write handed from `Response::write` to whatever owns the `Stream`
/// for this exchange (`h1::dispatcher`). Carries the committed head the
/// first time a write moves the response past `Open`, so the dispatcher
/// can encode the status line before the body bytes.
pub struct WriteOp {
    pub bytes: Bytes,
    pub last: bool,
    pub head: Option<(StatusCode, HeaderMap)>,
    pub completion: oneshot::Sender<std::io::Result<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Open,
    Committed,
    Completed,
}

/// Supplies trailers lazily, right before the chunked terminator is
/// written — `set_trailers_supplier` in §4.4.
pub type TrailersSupplier = Box<dyn FnOnce() -> HeaderMap + Send>;

/// A validated write not yet handed to the sink (see [`Response::write`]).
type PendingWrite = (Bytes, bool, Option<(StatusCode, HeaderMap)>);

pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    trailers: Option<TrailersSupplier>,
    state: WriteState,
    declared_length: Option<u64>,
    written: u64,
    sink: Option<mpsc::UnboundedSender<WriteOp>>,
    pending: Option<PendingWrite>,
    commit_threshold: u64,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            trailers: None,
            state: WriteState::Open,
            declared_length: None,
            written: 0,
            sink: None,
            pending: None,
            commit_threshold: u64::MAX,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `headers()` plus a synthesized `Content-Length` when `declared_length`
    /// is set but the handler never added the header itself — what the
    /// dispatcher actually encodes onto the wire (`h1::dispatcher::write_head`).
    pub(crate) fn effective_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Some(n) = self.declared_length {
            if !headers.contains_key(http::header::CONTENT_LENGTH) {
                let mut buf = itoa::Buffer::new();
                let value = HeaderValue::from_str(buf.format(n)).expect("decimal digits are a valid header value");
                headers.insert(http::header::CONTENT_LENGTH, value);
            }
        }
        headers
    }

    pub fn is_committed(&self) -> bool {
        !matches!(self.state, WriteState::Open)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, WriteState::Completed)
    }

    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Mutations after commit are ignored with a warning rather than
    /// rejected (§4.4 "silently ignored ... depending on policy" — this
    /// implementation's policy is: ignore).
    pub fn set_status(&mut self, status: StatusCode) {
        if self.is_committed() {
            tracing::warn!(target: "chan_http::response", "set_status after commit ignored");
            return;
        }
        self.status = status;
    }

    pub fn add_header(&mut self, name: http::HeaderName, value: HeaderValue) {
        if self.is_committed() {
            tracing::warn!(target: "chan_http::response", "add_header after commit ignored");
            return;
        }
        self.headers.append(name, value);
    }

    pub fn set_content_type(&mut self, value: HeaderValue) {
        if self.is_committed() {
            tracing::warn!(target: "chan_http::response", "set_content_type after commit ignored");
            return;
        }
        self.headers.insert(http::header::CONTENT_TYPE, value);
    }

    /// Setting content-length smaller than already-written bytes raises a
    /// framing error synchronously (§4.4), evaluated uniformly whether the
    /// caller is the original handler thread or a dispatched async worker
    /// (the `inWait` policy decided in SPEC_FULL.md §4.2).
    pub fn set_content_length(&mut self, n: u64) -> Result<(), FramingError> {
        if n < self.written {
            return Err(FramingError::TooMuchData {
                declared: n,
                written: self.written,
            });
        }
        if self.is_committed() {
            tracing::warn!(target: "chan_http::response", "set_content_length after commit ignored");
            return Ok(());
        }
        self.declared_length = Some(n);
        Ok(())
    }

    pub fn set_trailers_supplier(&mut self, supplier: TrailersSupplier) {
        self.trailers = Some(supplier);
    }

    pub fn take_trailers(&mut self) -> Option<TrailersSupplier> {
        self.trailers.take()
    }

    /// Only valid before commit (§4.4): restore status/headers/length as if
    /// nothing had been written.
    pub fn reset(&mut self) -> Result<(), ()> {
        if self.is_committed() {
            return Err(());
        }
        let sink = self.sink.take();
        let commit_threshold = self.commit_threshold;
        *self = Self::default();
        self.sink = sink;
        self.commit_threshold = commit_threshold;
        Ok(())
    }

    /// Wire this response to the dispatcher's write-op channel (`h1::dispatcher`).
    /// A `Response` with no sink bound (e.g. in unit tests) treats `write`
    /// as validation-only and always succeeds. `commit_threshold` bounds how
    /// large a single held-back write (see `write`) may grow before it's
    /// flushed eagerly rather than held for the next call to vouch for it.
    pub fn bind_sink(&mut self, sink: mpsc::UnboundedSender<WriteOp>, commit_threshold: u64) {
        self.sink = Some(sink);
        self.commit_threshold = commit_threshold;
    }

    /// Drop this response's half of the write-op channel. Called by the
    /// dispatcher once the handler has returned, so its write-op receiver
    /// observes the channel close after draining whatever was already
    /// queued, instead of waiting forever for a sender that will never
    /// produce more.
    pub fn close_sink(&mut self) {
        self.sink = None;
    }

    /// Validate (and record) a body write of `n` bytes about to be handed
    /// to the stream. Returns the framing error to fail the exchange with
    /// if this write would violate the declared `Content-Length`, or if
    /// `last` closes the body short of it.
    ///
    /// The very first call (committed == false) is what moves the response
    /// past `Open` — matching "the state machine records the committed
    /// flag when the writer transitions past OPEN" (§4.2).
    pub fn record_write(&mut self, n: u64, last: bool) -> Result<bool, FramingError> {
        self.written += n;

        if let Some(declared) = self.declared_length {
            if self.written > declared {
                return Err(FramingError::TooMuchData {
                    declared,
                    written: self.written,
                });
            }
            if last && self.written < declared {
                return Err(FramingError::TooLittleData {
                    declared,
                    written: self.written,
                });
            }
        }

        let just_committed = self.state == WriteState::Open;
        if just_committed {
            self.state = WriteState::Committed;
        }
        if last {
            self.state = WriteState::Completed;
        }
        Ok(just_committed)
    }

    /// §4.4 `write(last, completion, buffers...)`, collapsed to one buffer
    /// per call the way the teacher's `AsyncIo`-backed writes work. Framing
    /// violations are reported synchronously, before anything reaches the
    /// sink — record_write runs first and short-circuits on `?`.
    ///
    /// A validated write is held one call behind rather than sent
    /// immediately: it only reaches the sink once a *later* call (another
    /// write, or `set_content_length`) has validated cleanly, which is what
    /// lets a handler that writes first and only discovers the violation on
    /// a later statement (§8 scenario 4) still fail before anything is on
    /// the wire. `last=true`, or a write at least `commit_threshold` bytes
    /// long, flushes immediately instead of waiting for a call that isn't
    /// coming. Completions still fire FIFO since each `write` is `.await`ed
    /// before the caller issues the next one.
    pub async fn write(&mut self, bytes: Bytes, last: bool) -> Result<(), FramingError> {
        let just_committed = self.record_write(bytes.len() as u64, last)?;
        let head = just_committed.then(|| (self.status, self.effective_headers()));

        if let Some((prev_bytes, prev_last, prev_head)) = self.pending.take() {
            self.send_now(prev_bytes, prev_last, prev_head).await;
        }

        if last || bytes.len() as u64 >= self.commit_threshold {
            self.send_now(bytes, last, head).await;
        } else {
            self.pending = Some((bytes, last, head));
        }
        Ok(())
    }

    /// §4.4 `flush(completion)`: push whatever's held back out without
    /// closing the body, skipping record_write's bookkeeping since nothing
    /// new is being written.
    pub async fn flush(&mut self) -> Result<(), FramingError> {
        if let Some((bytes, last, head)) = self.pending.take() {
            self.send_now(bytes, last, head).await;
        }
        Ok(())
    }

    async fn send_now(&mut self, bytes: Bytes, last: bool, head: Option<(StatusCode, HeaderMap)>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let (completion, rx) = oneshot::channel();
        if sink.send(WriteOp { bytes, last, head, completion }).is_err() {
            return;
        }
        // an IO failure downstream isn't a framing error; the dispatcher
        // already knows the connection died and will tear the exchange
        // down, so there's nothing further to report here.
        let _ = rx.await;
    }

    /// A write validated but still held back (see `write`), taken by the
    /// dispatcher once the handler returns so nothing buffered here is
    /// silently dropped on a successful exchange.
    pub fn take_pending(&mut self) -> Option<(Bytes, bool, Option<(StatusCode, HeaderMap)>)> {
        self.pending.take()
    }

    /// Produce the 500 response the channel generates itself for a
    /// pre-commit handler failure (§7 "handler exception before commit").
    pub fn server_error(message: &str) -> (StatusCode, HeaderMap, bytes::Bytes) {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        let _ = message; // body intentionally empty unless an error hook supplies one
        (StatusCode::INTERNAL_SERVER_ERROR, headers, bytes::Bytes::new())
    }
}
