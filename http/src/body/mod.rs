//! §3 Content chunk model and the two body types built on it: the
//! demand-driven [`RequestBody`] the application reads from, and the
//! [`BodySize`]/[`ResponseBody`] pair the dispatcher uses to frame what the
//! handler writes.

mod chunk;
pub mod request_body;
mod response_body;

pub use chunk::Chunk;
pub use request_body::{RequestBody, RequestBodySender};
pub use response_body::{BodySize, Once, ResponseBody};
