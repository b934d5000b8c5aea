//! §3 Request metadata + §4.3 read-side interface.
//!
//! Request metadata (method/URI/version/headers) is immutable after
//! creation, so it is carried verbatim on [`http::Request`] (the same
//! re-export the teacher crate builds `HttpRequest<B>` on top of in
//! `src/http/request.rs`). Everything this spec adds on top — declared
//! content length, error/completion listeners, the attribute bag — lives on
//! the wrapper defined here. Attributes use `http::Extensions` (a
//! type-indexed map already built into the `Parts` the teacher's `http`
//! dependency provides), which is exactly the §9 redesign target: "thread
//! local request attributes → attributes live on the Request entity; no
//! ambient state."

use std::sync::Mutex;

use crate::{body::RequestBody, error::BodyError};

/// Declared request content length (§3): `Unknown` is the `-1` sentinel,
/// `Chunked` is the dedicated sentinel for `Transfer-Encoding: chunked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    Unknown,
    Fixed(u64),
    Chunked,
}

/// One request/response exchange's read side: immutable metadata plus the
/// demand-driven content stream and listener registries.
pub struct Request<B = RequestBody> {
    inner: http::Request<B>,
    content_length: ContentLength,
    error_listeners: Mutex<Vec<Box<dyn FnOnce(&BodyError) + Send>>>,
    completion_listeners: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl<B> Request<B> {
    pub fn new(inner: http::Request<B>, content_length: ContentLength) -> Self {
        Self {
            inner,
            content_length,
            error_listeners: Mutex::new(Vec::new()),
            completion_listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn method(&self) -> &http::Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &http::Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> http::Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &http::HeaderMap {
        self.inner.headers()
    }

    pub fn content_length(&self) -> ContentLength {
        self.content_length
    }

    pub fn extensions(&self) -> &http::Extensions {
        self.inner.extensions()
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        self.inner.extensions_mut()
    }

    pub fn body(&self) -> &B {
        self.inner.body()
    }

    pub fn map_body<B2>(self, f: impl FnOnce(B) -> B2) -> Request<B2> {
        let (parts, body) = self.inner.into_parts();
        let body = f(body);
        Request {
            inner: http::Request::from_parts(parts, body),
            content_length: self.content_length,
            error_listeners: self.error_listeners,
            completion_listeners: self.completion_listeners,
        }
    }

    /// §4.3: fire every registered error listener, in registration order,
    /// exactly once. Called by the channel when the exchange fails.
    pub fn notify_error(&self, err: &BodyError) {
        let listeners = std::mem::take(&mut *self.error_listeners.lock().unwrap());
        for listener in listeners {
            listener(err);
        }
    }

    /// §4.3/§5: fire every registered completion listener, in registration
    /// order, exactly once, after error listeners have already run.
    pub fn notify_completed(&self) {
        let listeners = std::mem::take(&mut *self.completion_listeners.lock().unwrap());
        for listener in listeners {
            listener();
        }
    }

    pub fn add_error_listener<F>(&self, listener: F)
    where
        F: FnOnce(&BodyError) + Send + 'static,
    {
        self.error_listeners.lock().unwrap().push(Box::new(listener));
    }

    pub fn add_completion_listener<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.completion_listeners.lock().unwrap().push(Box::new(listener));
    }
}

impl Request<RequestBody> {
    /// §4.3 `read_content`.
    pub fn read_content(&self) -> Option<crate::body::Chunk> {
        self.inner.body().read_content()
    }

    /// §4.3 `demand_content`.
    pub fn demand_content<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.body().demand_content(callback);
    }

    /// Blocking convenience read (§4.3), trampolined rather than recursive.
    pub async fn next_chunk(&self) -> Option<crate::body::Chunk> {
        self.inner.body().next_chunk().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_fire_once_in_registration_order() {
        let inner = http::Request::builder().body(()).unwrap();
        let req = Request::new(inner, ContentLength::Fixed(0));

        let order = std::sync::Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        req.add_completion_listener(move || o1.lock().unwrap().push(1));
        req.add_completion_listener(move || o2.lock().unwrap().push(2));

        req.notify_completed();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);

        // second call fires nothing: listeners were drained.
        req.notify_completed();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
