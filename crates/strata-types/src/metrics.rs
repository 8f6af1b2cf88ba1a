use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Store-wide usage counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStoreMetrics {
    pub blob_count: u64,
    pub total_size: u64,
    pub available_space: u64,
    /// The backing storage has no meaningful space limit.
    pub unlimited: bool,
}

impl BlobStoreMetrics {
    /// Combine two views into one. Counts and sizes add up, the store is
    /// unlimited if either side is.
    pub fn merge(self, other: Self) -> Self {
        Self {
            blob_count: self.blob_count + other.blob_count,
            total_size: self.total_size + other.total_size,
            available_space: self.available_space.saturating_add(other.available_space),
            unlimited: self.unlimited || other.unlimited,
        }
    }
}

/// Kind of blob operation tracked in [`OperationMetrics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationType {
    Upload,
    Download,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
        }
    }
}

/// Request counters for one [`OperationType`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub blob_size: u64,
    pub successful_requests: u64,
    pub error_requests: u64,
    pub time_on_requests_ms: u64,
}

impl OperationMetrics {
    /// Field-wise sum.
    pub fn add(self, other: Self) -> Self {
        Self {
            blob_size: self.blob_size + other.blob_size,
            successful_requests: self.successful_requests + other.successful_requests,
            error_requests: self.error_requests + other.error_requests,
            time_on_requests_ms: self.time_on_requests_ms + other.time_on_requests_ms,
        }
    }
}

/// Operation metrics keyed by type.
pub type OperationMetricsByType = BTreeMap<OperationType, OperationMetrics>;
