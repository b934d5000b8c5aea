//! Request-line/header parsing and response status-line/header encoding
//! (§4.1/§6), grounded in the teacher dispatcher's `Context` type
//! (`h1/proto/context.rs` in the teacher crate: `decode_head`, `encode_head`,
//! `ConnectionType`, the expect-100-continue flag).

use bytes::BytesMut;
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri, Version};

use crate::{
    date::DateTime,
    h1::proto::{
        buf::BufWrite,
        error::{Parse, ProtoError},
    },
    request::ContentLength,
};

/// What the connection does once this exchange completes, decided from the
/// request's `Connection`/`Host`/version headers (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Nothing seen yet; defaults to the per-version keep-alive rule.
    Init,
    KeepAlive,
    Close,
    Upgrade,
}

/// Per-exchange parsing/encoding context: the expect-100 flag and the
/// decided connection type travel with the exchange from `decode_head`
/// through to `encode_head`.
pub struct Context<const HEADER_LIMIT: usize> {
    ctype: ConnectionType,
    expect_continue: bool,
}

impl<const HEADER_LIMIT: usize> Default for Context<HEADER_LIMIT> {
    fn default() -> Self {
        Self {
            ctype: ConnectionType::Init,
            expect_continue: false,
        }
    }
}

impl<const HEADER_LIMIT: usize> Context<HEADER_LIMIT> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ctype(&self) -> ConnectionType {
        self.ctype
    }

    pub fn set_ctype(&mut self, ctype: ConnectionType) {
        self.ctype = ctype;
    }

    pub fn is_connection_closed(&self) -> bool {
        matches!(self.ctype, ConnectionType::Close)
    }

    pub fn is_expect_header(&self) -> bool {
        self.expect_continue
    }

    /// Parse one request head out of `src`. Returns `Ok(None)` when more
    /// bytes are needed; consumes the parsed bytes (including the blank
    /// line) from `src` on success.
    pub fn decode_head(&mut self, src: &mut BytesMut) -> Result<Option<Request<()>>, ProtoError> {
        if src.len() > HEADER_LIMIT * 128 {
            return Err(ProtoError::Parse(Parse::HeaderTooLarge));
        }

        let mut headers_buf = [httparse::EMPTY_HEADER; 128];
        let mut parsed = httparse::Request::new(&mut headers_buf);

        let status = parsed.parse(src).map_err(ProtoError::from)?;
        let consumed = match status {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(None),
        };

        if parsed.headers.len() > HEADER_LIMIT {
            return Err(ProtoError::Parse(Parse::HeaderTooLarge));
        }

        let method = parsed
            .method
            .ok_or(ProtoError::Parse(Parse::Request))?
            .parse::<Method>()
            .map_err(|_| ProtoError::Parse(Parse::Request))?;
        let uri = parsed
            .path
            .ok_or(ProtoError::Parse(Parse::Request))?
            .parse::<Uri>()
            .map_err(|_| ProtoError::Parse(Parse::Request))?;
        let version = if parsed.version == Some(1) {
            Version::HTTP_11
        } else {
            Version::HTTP_10
        };

        let mut headers = HeaderMap::with_capacity(parsed.headers.len());
        let mut content_length = ContentLength::Unknown;
        let mut has_transfer_encoding_chunked = false;
        self.expect_continue = false;

        for h in parsed.headers.iter() {
            let name = http::HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| ProtoError::Parse(Parse::Request))?;
            let value =
                HeaderValue::from_bytes(h.value).map_err(|_| ProtoError::Parse(Parse::Request))?;

            if name == http::header::CONTENT_LENGTH {
                let text = value.to_str().map_err(|_| ProtoError::Parse(Parse::ContentLength))?;
                let n: u64 = text.trim().parse().map_err(|_| ProtoError::Parse(Parse::ContentLength))?;
                content_length = ContentLength::Fixed(n);
            } else if name == http::header::TRANSFER_ENCODING {
                if value.as_bytes().eq_ignore_ascii_case(b"chunked") {
                    has_transfer_encoding_chunked = true;
                }
            } else if name == http::header::CONNECTION {
                let text = value.to_str().unwrap_or("");
                if text.eq_ignore_ascii_case("close") {
                    self.ctype = ConnectionType::Close;
                } else if text.eq_ignore_ascii_case("keep-alive") {
                    self.ctype = ConnectionType::KeepAlive;
                } else if text.eq_ignore_ascii_case("upgrade") {
                    self.ctype = ConnectionType::Upgrade;
                }
            } else if name == http::header::EXPECT {
                if value.as_bytes().eq_ignore_ascii_case(b"100-continue") {
                    self.expect_continue = true;
                }
            }

            headers.append(name, value);
        }

        if has_transfer_encoding_chunked {
            content_length = ContentLength::Chunked;
        }

        if self.ctype == ConnectionType::Init {
            self.ctype = match version {
                Version::HTTP_11 => ConnectionType::KeepAlive,
                _ => ConnectionType::Close,
            };
        }

        src.advance_to(consumed);

        let mut builder = Request::builder().method(method).uri(uri).version(version);
        *builder.headers_mut().unwrap() = headers;
        let request = builder.body(()).map_err(|_| ProtoError::Parse(Parse::Request))?;

        Ok(Some(with_content_length(request, content_length)))
    }

    /// Write the status line and headers for one response, plus the
    /// ambient `Date`/`Server` headers when configured (§6).
    #[allow(clippy::too_many_arguments)]
    pub fn encode_head(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        version: Version,
        send_server_header: bool,
        date: Option<&dyn DateTime>,
        dst: &mut impl BufWrite,
    ) {
        let version_str = if version == Version::HTTP_10 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        };
        dst.buffer(version_str.as_bytes());
        dst.buffer(b" ");
        let mut code = itoa::Buffer::new();
        dst.buffer(code.format(status.as_u16()).as_bytes());
        dst.buffer(b" ");
        dst.buffer(status.canonical_reason().unwrap_or("").as_bytes());
        dst.buffer(b"\r\n");

        for (name, value) in headers {
            dst.buffer(name.as_str().as_bytes());
            dst.buffer(b": ");
            dst.buffer(value.as_bytes());
            dst.buffer(b"\r\n");
        }

        if send_server_header {
            dst.buffer(b"server: chan-http\r\n");
        }
        if let Some(date) = date {
            date.with_date(|bytes| {
                dst.buffer(b"date: ");
                dst.buffer(bytes);
                dst.buffer(b"\r\n");
            });
        }

        match self.ctype {
            ConnectionType::Close => dst.buffer(b"connection: close\r\n"),
            ConnectionType::KeepAlive if version == Version::HTTP_10 => {
                dst.buffer(b"connection: keep-alive\r\n")
            }
            _ => {}
        }

        dst.buffer(b"\r\n");
    }

    /// `100 Continue` interim response (§6 "expect-100-continue").
    pub fn encode_continue(&self, dst: &mut impl BufWrite) {
        dst.buffer(b"HTTP/1.1 100 Continue\r\n\r\n");
    }
}

fn with_content_length(request: Request<()>, content_length: ContentLength) -> Request<()> {
    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(content_length);
    Request::from_parts(parts, body)
}

trait AdvanceTo {
    fn advance_to(&mut self, n: usize);
}

impl AdvanceTo for BytesMut {
    fn advance_to(&mut self, n: usize) {
        let _ = self.split_to(n.min(self.len()));
    }
}

/// Pull the [`ContentLength`] this head was decoded with back out of the
/// extensions bag `decode_head` stashed it in.
pub fn content_length_of(request: &Request<()>) -> ContentLength {
    request
        .extensions()
        .get::<ContentLength>()
        .copied()
        .unwrap_or(ContentLength::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_get_request() {
        let mut ctx = Context::<64>::new();
        let mut buf = BytesMut::from(&b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
        let req = ctx.decode_head(&mut buf).unwrap().unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.uri().path(), "/hello");
        assert_eq!(ctx.ctype(), ConnectionType::KeepAlive);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_head_requests_more_bytes() {
        let mut ctx = Context::<64>::new();
        let mut buf = BytesMut::from(&b"GET /hello HTTP/1.1\r\n"[..]);
        assert!(ctx.decode_head(&mut buf).unwrap().is_none());
    }

    #[test]
    fn parses_content_length_and_expect_continue() {
        let mut ctx = Context::<64>::new();
        let mut buf = BytesMut::from(
            &b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n"[..],
        );
        let req = ctx.decode_head(&mut buf).unwrap().unwrap();
        assert_eq!(content_length_of(&req), ContentLength::Fixed(5));
        assert!(ctx.is_expect_header());
    }

    #[test]
    fn http_10_defaults_to_close() {
        let mut ctx = Context::<64>::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.0\r\n\r\n"[..]);
        ctx.decode_head(&mut buf).unwrap();
        assert_eq!(ctx.ctype(), ConnectionType::Close);
    }

    #[test]
    fn encode_head_writes_status_line_and_headers() {
        let ctx = Context::<64>::new();
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from_static("2"));
        let mut dst = crate::h1::proto::buf::FlatBuf::<256>::new();
        ctx.encode_head(StatusCode::OK, &headers, Version::HTTP_11, false, None, &mut dst);
        let text = std::str::from_utf8(dst.as_slice()).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
