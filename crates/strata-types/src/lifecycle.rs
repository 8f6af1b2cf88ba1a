use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a blob store.
///
/// ```text
/// New -> Started -> Stopped -> Started ...
///  \________\__________\______> Failed
///  \________\__________\______> Shutdown (terminal)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    New,
    Started,
    Stopped,
    Failed,
    Shutdown,
}

impl LifecycleState {
    /// States from which a store may be (re)started.
    pub const STARTABLE: &'static [Self] = &[Self::New, Self::Stopped];

    /// States in which structural operations such as `remove` are legal.
    pub const NOT_RUNNING: &'static [Self] = &[Self::New, Self::Stopped, Self::Failed, Self::Shutdown];

    /// Returns `true` if blob operations are currently legal.
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Started => write!(f, "STARTED"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}
