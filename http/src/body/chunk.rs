use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;

use crate::error::BodyError;

/// One item of the ordered content sequence described in spec §3.
///
/// `Data` owns its buffer as a `Bytes`; "the consumer must release it" maps
/// onto Rust's ownership model directly — once the last clone of the
/// `Bytes` is dropped the backing allocation is freed, there is no separate
/// release call to forget. A chunk sequence is terminated by exactly one of
/// `Eof`, a `Data` chunk with `last: true`, `Error`, or `Trailers` followed
/// by `Eof`.
#[derive(Debug, Clone)]
pub enum Chunk {
    Data { bytes: Bytes, last: bool },
    Eof,
    Trailers(HeaderMap),
    Error(Arc<BodyError>),
}

impl Chunk {
    pub fn data(bytes: Bytes) -> Self {
        Self::Data { bytes, last: false }
    }

    pub fn last_data(bytes: Bytes) -> Self {
        Self::Data { bytes, last: true }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Eof | Self::Error(_)) || matches!(self, Self::Data { last: true, .. })
    }
}
