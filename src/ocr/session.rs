//! Per-client soft caches: the resolved model, the server's model tags and
//! the request mode that last worked.
//!
//! The lock is only held to copy a value in or out, never across an
//! `.await`, so a plain `std::sync::Mutex` is enough. A poisoned lock still
//! holds a usable cache, so poisoning is ignored.

use crate::error::RequestMode;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct SessionState {
    model: Option<String>,
    tags: Option<Vec<String>>,
    mode: RequestMode,
}

#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cached_model(&self) -> Option<String> {
        self.lock().model.clone()
    }

    pub fn remember_model(&self, model: impl Into<String>) {
        self.lock().model = Some(model.into());
    }

    pub fn cached_tags(&self) -> Option<Vec<String>> {
        self.lock().tags.clone()
    }

    pub fn remember_tags(&self, tags: Vec<String>) {
        self.lock().tags = Some(tags);
    }

    /// The mode to try first.
    pub fn mode(&self) -> RequestMode {
        self.lock().mode
    }

    pub fn remember_mode(&self, mode: RequestMode) {
        self.lock().mode = mode;
    }
}
