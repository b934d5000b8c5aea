//! Minimal async request/response seam. The channel in `chan-http` is
//! generic over [`Service`] rather than calling a handler type directly, so
//! middleware can wrap one `Service` in another without the channel knowing
//! about it — the §9 redesign of the deep `Handler`/`HandlerWrapper`
//! inheritance chain into "one capability, composed by explicit wrappers".

use std::future::Future;

/// Something that turns a `Req` into a `Response` (or fails with `Error`).
///
/// This is deliberately a single method trait: middleware is just another
/// `Service` whose `call` delegates to an inner one, not a subclass.
pub trait Service<Req> {
    type Response;
    type Error;

    fn call(&self, req: Req) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

/// Constructs a [`Service`] from shared, per-worker configuration.
///
/// Kept distinct from `Service` itself (rather than folding construction
/// into `Service::call`) so a factory can do fallible async setup — opening
/// a connection pool, loading TLS certs — once per worker instead of once
/// per request.
pub trait ServiceFactory<Req> {
    type Response;
    type Error;
    type Service: Service<Req, Response = Self::Response, Error = Self::Error>;
    type InitError;

    fn new_service(&self) -> impl Future<Output = Result<Self::Service, Self::InitError>> + Send;
}

/// Blanket impl so a bare async closure can stand in for a `Service` in
/// tests and small examples without a wrapper type.
impl<F, Fut, Req, Res, Err> Service<Req> for F
where
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Result<Res, Err>> + Send,
{
    type Response = Res;
    type Error = Err;

    fn call(&self, req: Req) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send {
        self(req)
    }
}
