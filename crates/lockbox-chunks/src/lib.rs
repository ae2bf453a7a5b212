//! lockbox-chunks: moving large blobs over a message-size-bounded channel
//!
//! # Overview
//! - `split`: cut a blob into fixed-size, indexed chunks
//! - `ingest`: receiver side of a single-item upload (metadata first, then raw chunks)
//! - `frame`: sender side of a multi-item listing (marker, then chunk run, per item)
//! - `assemble`: receiver side of a listing, rebuilding each item's blob
//!
//! Nothing here knows what the bytes are; headers are generic so the same
//! code serves vault records and tests alike.

pub mod assemble;
pub mod frame;
pub mod ingest;
pub mod split;

pub use assemble::StreamAssembler;
pub use frame::{emit, ChunkFrame, Emitter, Frame, ItemMarker};
pub use ingest::{Ingest, IngestMessage};
pub use split::{split, total_chunks, ChunkSlice};

/// Default chunk size (1 MiB), well under gRPC's 4 MiB message ceiling
pub const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("first message must carry item metadata")]
    MissingMetadata,

    #[error("item metadata already received")]
    UnexpectedMetadata,

    #[error("upload exceeds limit of {limit} bytes")]
    LimitExceeded { limit: usize },
}
