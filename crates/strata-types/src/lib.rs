//! Foundation types for Strata blob stores.
//!
//! Every other Strata crate depends on `strata-types`. Nothing here performs
//! I/O; these are the values that flow between member stores, the store
//! registry, and blob store groups.
//!
//! # Key Types
//!
//! - [`BlobId`] -- Opaque, string-backed blob identifier
//! - [`ContentHash`] -- BLAKE3 digest of blob content
//! - [`BlobHeaders`] / [`BlobMetrics`] / [`BlobAttributes`] -- Per-blob metadata
//! - [`BlobStoreConfiguration`] -- Named, typed store configuration with namespaced attributes
//! - [`BlobStoreMetrics`] / [`OperationMetrics`] -- Store-level counters
//! - [`LifecycleState`] -- Store lifecycle (new, started, stopped, failed, shutdown)

pub mod attributes;
pub mod config;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod metrics;

pub use attributes::{headers, BlobAttributes, BlobHeaders, BlobMetrics};
pub use config::BlobStoreConfiguration;
pub use error::TypeError;
pub use id::{BlobId, ContentHash};
pub use lifecycle::LifecycleState;
pub use metrics::{BlobStoreMetrics, OperationMetrics, OperationMetricsByType, OperationType};
