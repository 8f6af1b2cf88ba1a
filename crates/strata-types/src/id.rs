use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Prefix marking a blob whose id is derived from its logical path.
pub const DIRECT_PATH_PREFIX: &str = "path$";

/// Opaque identifier for a stored blob.
///
/// Blob ids are unique within a single member store by construction and
/// unique across members only by convention: there is no global allocator.
/// Ids created with [`BlobId::random`] are UUID v7 strings, so they sort
/// roughly by creation time.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Wrap an existing identifier without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh time-ordered identifier (UUID v7).
    pub fn random() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Identifier for a direct-path blob stored under `blob_name`.
    pub fn direct_path(blob_name: &str) -> Self {
        Self(format!("{DIRECT_PATH_PREFIX}{blob_name}"))
    }

    /// Parse an identifier, rejecting empty strings and embedded whitespace.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::InvalidBlobId("empty".into()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidBlobId(format!(
                "'{s}' contains whitespace"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this id addresses a direct-path blob.
    pub fn is_direct_path(&self) -> bool {
        self.0.starts_with(DIRECT_PATH_PREFIX)
    }

    /// The logical path of a direct-path blob, if this is one.
    pub fn direct_path_name(&self) -> Option<&str> {
        self.0.strip_prefix(DIRECT_PATH_PREFIX)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BlobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// BLAKE3 digest of a blob's content bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash a complete content buffer.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `ContentHash` from a pre-computed digest.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
