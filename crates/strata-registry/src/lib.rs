//! Named blob store registry for Strata.
//!
//! The registry owns the set of live, started stores and is the only way
//! stores come into being: a [`BlobStoreConfiguration`] is turned into a
//! store by the [`BlobStoreFactory`] registered for its type.
//!
//! # Modules
//!
//! - [`traits`] -- [`BlobStoreRegistry`] and [`BlobStoreFactory`]
//! - [`memory`] -- [`InMemoryBlobStoreRegistry`]
//! - [`factory`] -- [`MemoryBlobStoreFactory`] for in-memory member stores
//!
//! [`BlobStoreConfiguration`]: strata_types::BlobStoreConfiguration

pub mod factory;
pub mod memory;
pub mod traits;

pub use factory::MemoryBlobStoreFactory;
pub use memory::InMemoryBlobStoreRegistry;
pub use traits::{BlobStoreFactory, BlobStoreRegistry};
