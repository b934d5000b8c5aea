//! §6 Handler contract and §9's collapse of the teacher-source's deep
//! `Handler`/`AbstractHandler`/`HandlerWrapper` inheritance chain into one
//! capability plus explicit composition.
//!
//! `handle` is async (AFIT, the same shape as [`chan_service::Service::call`])
//! rather than the distilled spec's bare `-> bool`: `Response::write` needs
//! to `.await` its completion (§4.4's FIFO write-completion ordering), and a
//! handler that streams a body — scenario 2's echo — must be able to await
//! `Request::next_chunk()` between writes. Composition is generic rather
//! than `Box<dyn Handler>` + trait objects, since `async fn` in a trait
//! isn't dyn-compatible without boxing every call's future; a compile-time
//! wrapper stack costs nothing at a call site that would otherwise box.

use std::future::Future;

use crate::{error::FramingError, request::Request, response::Response};

/// Application code invoked with a request and a response. Returning
/// `Ok(true)` means the handler took responsibility for the exchange;
/// `Ok(false)` triggers the channel's default 404 generation (§6). `Err`
/// propagates a framing violation raised by `response.write()`/
/// `set_content_length()` back to the dispatcher (§7 "content-length
/// violation: abort with framing error") — the `?` on those calls is the
/// ordinary way a handler reports one, not a caught-and-rethrown exception.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &Request, response: &mut Response) -> impl Future<Output = Result<bool, FramingError>> + Send;
}

impl<F, Fut> Handler for F
where
    F: Fn(&Request, &mut Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, FramingError>> + Send,
{
    fn handle(&self, request: &Request, response: &mut Response) -> impl Future<Output = Result<bool, FramingError>> + Send {
        self(request, response)
    }
}

/// §9: "middleware is a list of `(inner) -> handler` factories" replacing
/// the teacher-source's `HandlerWrapper` subclassing — `before` runs ahead
/// of `inner`, is given the chance to fully answer the exchange itself
/// (returning `true` short-circuits `inner`), otherwise `inner` runs
/// exactly as if `before` weren't there.
pub struct Wrapped<Before, Inner> {
    before: Before,
    inner: Inner,
}

impl<Before, Inner> Wrapped<Before, Inner> {
    pub fn new(before: Before, inner: Inner) -> Self {
        Self { before, inner }
    }
}

impl<Before, Inner> Handler for Wrapped<Before, Inner>
where
    Before: Handler,
    Inner: Handler,
{
    async fn handle(&self, request: &Request, response: &mut Response) -> Result<bool, FramingError> {
        if self.before.handle(request, response).await? {
            return Ok(true);
        }
        self.inner.handle(request, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{body::RequestBody, request::ContentLength};
    use std::sync::{Arc, Mutex};

    fn empty_request() -> Request {
        let inner = http::Request::builder().body(RequestBody::empty()).unwrap();
        Request::new(inner, ContentLength::Fixed(0))
    }

    #[tokio::test]
    async fn closure_handler_can_take_responsibility() {
        let handler = |_req: &Request, res: &mut Response| {
            res.set_status(http::StatusCode::OK);
            async { Ok(true) }
        };
        let req = empty_request();
        let mut res = Response::new();
        assert!(handler.handle(&req, &mut res).await.unwrap());
        assert_eq!(res.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn wrapper_short_circuits_inner_when_it_takes_responsibility() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_before = log.clone();
        let log_inner = log.clone();

        let before = move |_: &Request, _: &mut Response| {
            log_before.lock().unwrap().push("before");
            async { Ok(true) }
        };
        let inner = move |_: &Request, _: &mut Response| {
            log_inner.lock().unwrap().push("inner");
            async { Ok(true) }
        };
        let composed = Wrapped::new(before, inner);

        let req = empty_request();
        let mut res = Response::new();
        assert!(composed.handle(&req, &mut res).await.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["before"]);
    }

    #[tokio::test]
    async fn wrapper_falls_through_to_inner_when_not_handled() {
        let before = |_: &Request, _: &mut Response| async { Ok(false) };
        let inner = |_: &Request, res: &mut Response| {
            res.set_status(http::StatusCode::CREATED);
            async { Ok(true) }
        };
        let composed = Wrapped::new(before, inner);

        let req = empty_request();
        let mut res = Response::new();
        assert!(composed.handle(&req, &mut res).await.unwrap());
        assert_eq!(res.status(), http::StatusCode::CREATED);
    }
}
