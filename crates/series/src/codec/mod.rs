//! Stream codec: varints and hashed block framing.
//!
//! This layer knows nothing about record types. The field codec in
//! [`crate::field`] drives a [`CodecWriter`] record by record and finishes
//! the block when a write reports that the block is full.

pub mod block;
pub mod varint;

pub use block::{content_hash, CodecReader, CodecWriter, BLOCK_HASH_SIZE, MIN_BLOCK_SIZE};
pub use varint::MAX_VARINT_LEN;
