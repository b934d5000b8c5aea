//! Demand-driven request content stream (§4.3). The dispatcher is the sole
//! producer (via [`RequestBodySender`]); the handler is the sole consumer
//! (via [`RequestBody`]). Both sides share one [`Shared`] guarded by a
//! single uncontended mutex — never held across an `.await` point, matching
//! the concurrency discipline in §5.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use bytes::Bytes;
use tokio::sync::Notify;

use super::Chunk;

struct Shared {
    queue: Mutex<VecDeque<Chunk>>,
    /// One-shot callback registered by `demand_content`, invoked by the
    /// producer side the next time it feeds a chunk. Storing it here
    /// (rather than calling back synchronously from `demand_content`)
    /// is what keeps delivery non-reentrant: the callback always runs from
    /// the producer's call stack, never from the consumer's registration.
    waiter: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    eof: AtomicBool,
}

/// Consumer handle: what the application/`Request` reads request content
/// through.
#[derive(Clone)]
pub struct RequestBody {
    inner: Arc<Shared>,
}

/// Producer handle: what the dispatcher feeds decoded body chunks into.
pub struct RequestBodySender {
    inner: Arc<Shared>,
}

/// Construct a connected sender/body pair. `RequestBody::empty()` should be
/// used instead when the request has no body at all (no heap allocation,
/// immediately at EOF).
pub fn channel() -> (RequestBodySender, RequestBody) {
    let inner = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        waiter: Mutex::new(None),
        eof: AtomicBool::new(false),
    });
    (
        RequestBodySender { inner: inner.clone() },
        RequestBody { inner },
    )
}

impl RequestBody {
    pub fn empty() -> Self {
        let (tx, rx) = channel();
        tx.feed_eof();
        rx
    }

    /// §4.3 `read_content`: non-blocking pull of the next already-buffered
    /// chunk, or `None` if nothing is ready yet.
    pub fn read_content(&self) -> Option<Chunk> {
        self.inner.queue.lock().unwrap().pop_front()
    }

    /// §4.3 `demand_content`: register a one-shot callback fired once
    /// content becomes available, or immediately if it already is.
    /// Re-arming after the callback fires requires calling this again.
    pub fn demand_content<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let has_content = !self.inner.queue.lock().unwrap().is_empty();
        if has_content || self.inner.eof.load(Ordering::Acquire) {
            callback();
            return;
        }
        *self.inner.waiter.lock().unwrap() = Some(Box::new(callback));
    }

    /// Blocking convenience read (§4.3): park on demand until a chunk
    /// arrives, looping rather than recursing so arbitrarily long content
    /// sequences (the spec's 100k-chunk scenario) never grow the call
    /// stack.
    pub async fn next_chunk(&self) -> Option<Chunk> {
        loop {
            if let Some(chunk) = self.read_content() {
                return Some(chunk);
            }
            if self.inner.eof.load(Ordering::Acquire) {
                return None;
            }
            let notify = Arc::new(Notify::new());
            let n = notify.clone();
            self.demand_content(move || n.notify_one());
            notify.notified().await;
        }
    }
}

impl RequestBodySender {
    pub fn feed_data(&self, bytes: Bytes) {
        self.inner.queue.lock().unwrap().push_back(Chunk::data(bytes));
        self.wake();
    }

    pub fn feed_last_data(&self, bytes: Bytes) {
        self.inner.queue.lock().unwrap().push_back(Chunk::last_data(bytes));
        self.inner.eof.store(true, Ordering::Release);
        self.wake();
    }

    pub fn feed_trailers(&self, trailers: http::HeaderMap) {
        self.inner.queue.lock().unwrap().push_back(Chunk::Trailers(trailers));
    }

    pub fn feed_eof(&self) {
        self.inner.queue.lock().unwrap().push_back(Chunk::Eof);
        self.inner.eof.store(true, Ordering::Release);
        self.wake();
    }

    pub fn feed_error(&self, err: crate::error::BodyError) {
        self.inner
            .queue
            .lock()
            .unwrap()
            .push_back(Chunk::Error(std::sync::Arc::new(err)));
        self.inner.eof.store(true, Ordering::Release);
        self.wake();
    }

    pub fn is_eof(&self) -> bool {
        self.inner.eof.load(Ordering::Acquire)
    }

    fn wake(&self) {
        if let Some(cb) = self.inner.waiter.lock().unwrap().take() {
            cb();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_chunks_in_order() {
        let (tx, rx) = channel();
        tx.feed_data(Bytes::from_static(b"a"));
        tx.feed_data(Bytes::from_static(b"b"));
        tx.feed_eof();

        assert!(matches!(rx.next_chunk().await, Some(Chunk::Data { bytes, .. }) if bytes == "a"));
        assert!(matches!(rx.next_chunk().await, Some(Chunk::Data { bytes, .. }) if bytes == "b"));
        assert!(matches!(rx.next_chunk().await, Some(Chunk::Eof)));
        assert!(rx.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn demand_fires_once_when_content_arrives_later() {
        let (tx, rx) = channel();
        let notified = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let n = notified.clone();
        rx.demand_content(move || n.store(true, Ordering::SeqCst));
        assert!(!notified.load(Ordering::SeqCst));
        tx.feed_data(Bytes::from_static(b"x"));
        assert!(notified.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handles_100k_chunks_without_recursion() {
        let (tx, rx) = channel();
        tokio::spawn(async move {
            for _ in 0..100_000 {
                tx.feed_data(Bytes::from_static(b"abcd"));
            }
            tx.feed_eof();
        });

        let mut total = 0usize;
        while let Some(chunk) = rx.next_chunk().await {
            match chunk {
                Chunk::Data { bytes, .. } => total += bytes.len(),
                Chunk::Eof => break,
                _ => {}
            }
        }
        assert_eq!(total, 400_000);
    }

    #[test]
    fn empty_body_is_immediately_eof() {
        let body = RequestBody::empty();
        assert!(matches!(body.read_content(), Some(Chunk::Eof)));
    }
}
