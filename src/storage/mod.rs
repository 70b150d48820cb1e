//! # Storage
//!
//! Chunked entity persistence over pluggable table backends.
//!
//! ```text
//! Entity ──serde_json──► JSON text ──ChunkedEntityCodec──► {P0..Pn} ──► TableBackend
//! ```
//!
//! The orchestrator keeps four tables: jobs, builds, fingerprints and
//! per-standard timestamps. Table names are configurable (see
//! [`StorageConfig`](crate::config::StorageConfig)).

pub mod backend;
pub mod codec;
pub mod errors;
pub mod keys;
pub mod repository;

pub use backend::{
    FileSystemTableBackend, InMemoryTableBackend, TableBackend, TableLimits, TableRow,
};
pub use codec::{
    ChunkLayout, ChunkSet, ChunkedEntityCodec, DEFAULT_SLOT_COUNT, DEFAULT_SLOT_SIZE_BYTES,
};
pub use errors::{CodecError, StorageError, StorageResult};
pub use keys::sanitize_key;
pub use repository::{EntityStore, TableEntity};
