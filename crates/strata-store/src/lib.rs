//! Blob storage contract for Strata.
//!
//! A blob store holds immutable binary blobs keyed by [`BlobId`], each with
//! caller-supplied headers and store-computed metrics. Blobs are soft-deleted
//! first and physically removed by compaction.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`InMemoryBlobStore`] -- map-backed store for tests and embedding. Its
//!   data lives in a shared [`MemoryVolume`] so that re-registering the store
//!   under another name keeps the content.
//!
//! Composite stores (groups of members) live in `strata-group` and implement
//! the same trait.
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written; only attributes change.
//! 2. `exists` and `get` both hide soft-deleted blobs; only
//!    `get_with_deleted` and the id streams still see them.
//! 3. Blob operations are legal only while the store is started.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod blob;
pub mod error;
pub mod guard;
pub mod memory;
pub mod traits;

pub use blob::Blob;
pub use error::{StoreError, StoreResult};
pub use guard::StateGuard;
pub use memory::{InMemoryBlobStore, MemoryVolume, MEMORY_SECTION, MEMORY_TYPE, VOLUME_KEY};
pub use traits::{BlobIdStream, BlobStore, BlobStoreUsageChecker};

pub use strata_types::BlobId;
