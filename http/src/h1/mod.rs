//! HTTP/1.x channel: the stream adapter and dispatcher loop built on top of
//! `h1::proto`'s wire-level primitives.

pub mod dispatcher;
pub mod proto;
pub mod shutdown;
pub mod stream;

pub use dispatcher::Dispatcher;
pub use shutdown::{InFlightGuard, ShutdownCoordinator};
pub use stream::{Stream, StreamEvent, StreamWrapper};
