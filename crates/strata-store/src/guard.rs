use std::sync::RwLock;

use strata_types::LifecycleState;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Tracks a store's [`LifecycleState`] and rejects calls made in the wrong
/// state.
#[derive(Debug)]
pub struct StateGuard {
    state: RwLock<LifecycleState>,
}

impl StateGuard {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::New),
        }
    }

    pub fn current(&self) -> LifecycleState {
        *self.state.read().expect("lock poisoned")
    }

    /// Fail with [`StoreError::InvalidState`] unless the current state is
    /// one of `allowed`.
    pub fn ensure(&self, store: &str, operation: &str, allowed: &[LifecycleState]) -> StoreResult<()> {
        let state = self.current();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(invalid(store, operation, state))
        }
    }

    /// Shorthand for `ensure(.., &[Started])`.
    pub fn ensure_started(&self, store: &str, operation: &str) -> StoreResult<()> {
        self.ensure(store, operation, &[LifecycleState::Started])
    }

    /// Move to `to` if the current state is one of `from`.
    pub fn transition(
        &self,
        store: &str,
        operation: &str,
        from: &[LifecycleState],
        to: LifecycleState,
    ) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if !from.contains(&state) {
            return Err(invalid(store, operation, *state));
        }
        debug!(store, from = %*state, to = %to, "lifecycle transition");
        *state = to;
        Ok(())
    }

    /// Move to `to` unconditionally.
    pub fn force(&self, to: LifecycleState) {
        *self.state.write().expect("lock poisoned") = to;
    }
}

impl Default for StateGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(store: &str, operation: &str, state: LifecycleState) -> StoreError {
    StoreError::InvalidState {
        store: store.to_string(),
        operation: operation.to_string(),
        state,
    }
}
