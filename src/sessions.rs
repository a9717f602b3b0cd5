//! Session registry.
//!
//! A session is a live binding between an opaque id and one attached provider
//! connection. The registry has a single owner — the scheduler's worker
//! thread — and is therefore a plain map with no interior locking; the
//! connection type is not `Send`, so misuse from another thread fails to
//! compile rather than at runtime.

use std::collections::HashMap;
use std::time::Duration;

use uuid::Uuid;

use crate::errors::ProviderError;
use crate::provider::{ElementHandle, ProviderConnection};

pub struct Session {
    id: String,
    connection: Box<dyn ProviderConnection>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process_id(&self) -> u32 {
        self.connection.process_id()
    }

    /// Fresh main-window lookup; the anchor for all selector resolution.
    pub fn main_window(&self, timeout: Duration) -> Result<Box<dyn ElementHandle>, ProviderError> {
        self.connection.main_window(timeout)
    }

    pub fn connection(&self) -> &dyn ProviderConnection {
        self.connection.as_ref()
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh connection under a newly allocated opaque id.
    pub fn create(&mut self, connection: Box<dyn ProviderConnection>) -> &Session {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            connection,
        };
        self.sessions.entry(id).or_insert(session)
    }

    pub fn try_get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn try_remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
