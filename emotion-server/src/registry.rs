//! In-memory session registry.
//!
//! Issues session tokens and answers membership checks for the lifetime of
//! the process. There is no removal: a restart starts from an empty set,
//! whatever the `session` table holds.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh 128-bit random token (32 lowercase hex chars) and mark it valid.
    pub fn issue(&self) -> String {
        let mut sessions = self.lock();
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if sessions.insert(id.clone()) {
                return id;
            }
        }
    }

    pub fn is_valid(&self, session_id: &str) -> bool {
        self.lock().contains(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A poisoned set is still consistent: every mutation is a single insert.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
