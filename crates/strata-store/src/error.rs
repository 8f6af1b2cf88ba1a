use strata_types::{BlobId, LifecycleState, TypeError};

/// Errors from blob store, registry, and group operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced blob is not held by any store that was asked.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// No member of a group could receive a new blob.
    #[error("unable to find a member blob store of '{group}' for create")]
    Placement { group: String },

    /// A configured group member could not be resolved to a live store.
    #[error("blob store group '{group}' cannot resolve member '{member}': {reason}")]
    MemberResolution {
        group: String,
        member: String,
        reason: String,
    },

    /// The operation is not legal in the store's current lifecycle state.
    #[error("{operation} is not allowed on blob store '{store}' in state {state}")]
    InvalidState {
        store: String,
        operation: String,
        state: LifecycleState,
    },

    /// No store is registered under this name.
    #[error("blob store not found: {0}")]
    StoreNotFound(String),

    /// A store is already registered under this name.
    #[error("blob store already exists: {0}")]
    AlreadyExists(String),

    /// No factory is registered for this store type.
    #[error("unknown blob store type: {0}")]
    UnknownStoreType(String),

    /// The store configuration is malformed or inconsistent.
    #[error("invalid configuration for blob store '{store}': {reason}")]
    InvalidConfiguration { store: String, reason: String },

    /// A required blob header was not supplied.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// The store cannot be promoted into a group.
    #[error("blob store '{store}' cannot be converted to a group: {reason}")]
    NotConvertible { store: String, reason: String },

    /// Declared content size does not match the actual content.
    #[error("size mismatch: declared {declared} bytes, found {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    /// The store does not accept new blobs.
    #[error("blob store '{0}' is read-only")]
    ReadOnly(String),

    /// The store registry backing a group has been dropped.
    #[error("blob store registry is no longer available")]
    RegistryUnavailable,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed attribute or identifier value.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
