//! Call-id -> state map. The orchestrator owns mutation; transcript/outbound
//! webhooks and the idle timer coordinate through the same lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::state::CallState;

/// A single call's state, shared between the orchestrator task and the
/// webhook handlers that feed it transcript/control events.
pub type SharedCall = Arc<Mutex<CallState>>;

/// Thread-safe map from call id to call state.
///
/// The map structure itself is guarded by one lock; holding it is always
/// brief (insert/lookup/remove). Per-call field mutation goes through the
/// per-call [`Mutex`] instead, so a slow reader never blocks unrelated calls.
#[derive(Debug, Clone, Default)]
pub struct CallStore {
    inner: Arc<Mutex<HashMap<String, SharedCall>>>,
}

impl CallStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new call, creating default state. Returns the shared handle.
    pub fn insert(&self, call_id: impl Into<String>) -> SharedCall {
        let call_id = call_id.into();
        let call = Arc::new(Mutex::new(CallState::new(call_id.clone())));
        self.inner
            .lock()
            .expect("call store mutex poisoned")
            .insert(call_id, call.clone());
        call
    }

    /// Look up a call by id.
    pub fn get(&self, call_id: &str) -> Option<SharedCall> {
        self.inner
            .lock()
            .expect("call store mutex poisoned")
            .get(call_id)
            .cloned()
    }

    /// Remove a call from the store. Called once a call has been finalized
    /// to DONE, from `http::media::finalize_call` — either promptly, via the
    /// transcript webhook's `-stopped`/`-error` handler, or as a fallback
    /// from the media bridge's post-teardown grace period if that webhook
    /// never arrives. Returns `None` if the entry is already gone, so both
    /// paths can race this harmlessly.
    pub fn remove(&self, call_id: &str) -> Option<SharedCall> {
        self.inner
            .lock()
            .expect("call store mutex poisoned")
            .remove(call_id)
    }

    /// Number of live calls.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("call store mutex poisoned").len()
    }

    /// Whether the store currently holds no calls.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
