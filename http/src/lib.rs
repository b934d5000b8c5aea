//! The embeddable HTTP/1.x channel core: per-connection parsing, framing,
//! commit semantics, the demand-driven content stream, and graceful
//! shutdown. Transport (TCP accept, TLS termination) and process wiring
//! live outside this crate — see `chan-server` and `chan-io`.

pub mod body;
pub mod config;
pub mod date;
pub mod error;
pub mod h1;
pub mod handler;
pub mod request;
pub mod response;

pub use config::HttpServiceConfig;
pub use date::{Date, DateTime};
pub use error::{BodyError, Error, FramingError};
pub use handler::{Handler, Wrapped};
pub use request::{ContentLength, Request};
pub use response::Response;

pub use h1::Dispatcher;
