//! §6 Configurable options, as a fluent-builder record passed at
//! construction (§9: "global mutable loggers, system-property flags" →
//! configuration record), with buffer sizes promoted to const generics the
//! way the teacher crate's `xitca_http::config::HttpServiceConfig` does —
//! buffer arrays can then be stack-allocated and sized at compile time.

use std::time::Duration;

#[derive(Clone, Copy, Debug)]
pub struct HttpServiceConfig<
    const HEADER_LIMIT: usize = 64,
    const READ_BUF_LIMIT: usize = 262_144,
    const WRITE_BUF_LIMIT: usize = 262_144,
> {
    /// How long a connection may sit idle before `on_error(Timeout)` fires.
    pub idle_timeout: Duration,
    /// How long a kept-alive connection may wait for the next request.
    pub keep_alive_timeout: Duration,
    /// Deadline for graceful shutdown to wait for in-flight exchanges.
    pub stop_timeout: Duration,
    /// Inject a `Server` response header at commit time.
    pub send_server_header: bool,
    /// Inject a `Date` response header at commit time.
    pub send_date_header: bool,
    /// Buffered-write threshold after which an un-sized response commits
    /// and switches to chunked transfer encoding.
    pub output_commit_threshold: usize,
    /// Hard cap on `application/x-www-form-urlencoded` body size.
    pub form_content_size_limit: usize,
    /// Hard cap on the number of keys accepted from a form body.
    pub form_key_count_limit: usize,
    /// Upper bound on bytes drained when an application doesn't consume the
    /// whole request body on a keep-alive connection (§7).
    pub unconsumed_drain_limit: usize,
    /// Prefer vectored writes when the underlying `AsyncIo` supports them.
    pub vectored_write: bool,
}

impl<const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize> Default
    for HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
{
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(30),
            send_server_header: false,
            send_date_header: true,
            output_commit_threshold: WRITE_BUF_LIMIT,
            form_content_size_limit: 256 * 1024,
            form_key_count_limit: 128,
            unconsumed_drain_limit: 256 * 1024,
            vectored_write: true,
        }
    }
}

impl<const HEADER_LIMIT: usize, const READ_BUF_LIMIT: usize, const WRITE_BUF_LIMIT: usize>
    HttpServiceConfig<HEADER_LIMIT, READ_BUF_LIMIT, WRITE_BUF_LIMIT>
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_timeout(mut self, dur: Duration) -> Self {
        self.idle_timeout = dur;
        self
    }

    pub fn keep_alive_timeout(mut self, dur: Duration) -> Self {
        self.keep_alive_timeout = dur;
        self
    }

    pub fn stop_timeout(mut self, dur: Duration) -> Self {
        self.stop_timeout = dur;
        self
    }

    pub fn send_server_header(mut self, yes: bool) -> Self {
        self.send_server_header = yes;
        self
    }

    pub fn send_date_header(mut self, yes: bool) -> Self {
        self.send_date_header = yes;
        self
    }

    pub fn output_commit_threshold(mut self, bytes: usize) -> Self {
        self.output_commit_threshold = bytes;
        self
    }

    pub const fn header_limit(&self) -> usize {
        HEADER_LIMIT
    }

    pub const fn read_buf_limit(&self) -> usize {
        READ_BUF_LIMIT
    }

    pub const fn write_buf_limit(&self) -> usize {
        WRITE_BUF_LIMIT
    }
}
