//! Cached wall-clock used for keep-alive deadlines and the `Date` response
//! header, grounded in the teacher crate's `util::date::DateTime`
//! abstraction passed into `Context::new(date)`. Formatting an HTTP date on
//! every response would cost more than the channel's own framing logic, so
//! the formatted value is refreshed on a slow background tick instead.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// What the dispatcher needs from a clock: a monotonic `now()` for timer
/// deadlines, and the current `Date` header value as preformatted bytes.
pub trait DateTime: Send + Sync {
    fn now(&self) -> Instant;
    fn with_date<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R;
}

/// Background-refreshed clock. `start` runs a tick every second for as long
/// as the returned `DateService` handle is kept alive.
pub struct Date {
    formatted: Arc<RwLock<Box<[u8]>>>,
    epoch_secs: Arc<AtomicU64>,
    _tick: Option<tokio::task::JoinHandle<()>>,
}

impl Date {
    /// Construct with an already-spawned background ticker (the common
    /// case inside a `tokio` runtime).
    pub fn spawn() -> Self {
        let formatted = Arc::new(RwLock::new(Self::format_now().into_boxed_slice()));
        let epoch_secs = Arc::new(AtomicU64::new(Self::now_epoch_secs()));

        let f = formatted.clone();
        let e = epoch_secs.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                *f.write().unwrap() = Self::format_now().into_boxed_slice();
                e.store(Self::now_epoch_secs(), Ordering::Relaxed);
            }
        });

        Self {
            formatted,
            epoch_secs,
            _tick: Some(handle),
        }
    }

    /// Construct without spawning a ticker; `with_date` formats on demand.
    /// Used by tests and anywhere no runtime is driving a background task.
    pub fn unticked() -> Self {
        Self {
            formatted: Arc::new(RwLock::new(Self::format_now().into_boxed_slice())),
            epoch_secs: Arc::new(AtomicU64::new(Self::now_epoch_secs())),
            _tick: None,
        }
    }

    fn format_now() -> Vec<u8> {
        httpdate::fmt_http_date(SystemTime::now()).into_bytes()
    }

    fn now_epoch_secs() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

impl DateTime for Date {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn with_date<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        if self._tick.is_none() {
            // No ticker running: always reformat so callers see a live value.
            let bytes = Self::format_now();
            return f(&bytes);
        }
        f(&self.formatted.read().unwrap())
    }
}

impl Drop for Date {
    fn drop(&mut self) {
        if let Some(handle) = self._tick.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unticked_date_formats_an_imf_fixdate() {
        let date = Date::unticked();
        date.with_date(|bytes| {
            let s = std::str::from_utf8(bytes).unwrap();
            assert!(s.ends_with("GMT"));
        });
    }
}
