use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use rcutil_events::Event;

use crate::error::ProtocolError;

/// Shared handle to a registered script
pub type ScriptHandle = Arc<Script>;

/// An external process that receives event callbacks.
///
/// Scripts are identified by name: two handles with the same name are the
/// same script as far as hashing and equality go.
pub struct Script {
    name: String,
    description: String,
    address: String,
    /// Event -> callback method name, at most one per event
    callbacks: Mutex<HashMap<Event, String>>,
}

impl Script {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            address: address.into(),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Address the transport should deliver callbacks to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Callback method registered for `event`, if any
    pub fn callback(&self, event: &Event) -> Option<String> {
        self.lock_callbacks().get(event).cloned()
    }

    pub fn callback_exists(&self, event: &Event) -> bool {
        self.lock_callbacks().contains_key(event)
    }

    /// Snapshot of every event this script currently has a callback for
    pub fn events(&self) -> Vec<Event> {
        self.lock_callbacks().keys().copied().collect()
    }

    pub fn callback_count(&self) -> usize {
        self.lock_callbacks().len()
    }

    /// Insert a callback entry. Leaves an existing entry untouched.
    pub(crate) fn register_callback(
        &self,
        event: Event,
        callback: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let mut callbacks = self.lock_callbacks();
        if callbacks.contains_key(&event) {
            return Err(ProtocolError::EVENT_CALLBACK_ALREADY_REGISTERED);
        }
        callbacks.insert(event, callback.into());
        Ok(())
    }

    pub(crate) fn deregister_callback(&self, event: &Event) -> Result<String, ProtocolError> {
        self.lock_callbacks()
            .remove(event)
            .ok_or(ProtocolError::EVENT_CALLBACK_NOT_REGISTERED)
    }

    /// Remove every callback entry, returning the events that had one
    pub(crate) fn clear_callbacks(&self) -> Vec<Event> {
        self.lock_callbacks().drain().map(|(event, _)| event).collect()
    }

    pub(crate) fn lock_callbacks(&self) -> MutexGuard<'_, HashMap<Event, String>> {
        // Entries are inserted and removed whole; a poisoned map is still consistent
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Script {}

impl Hash for Script {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("callbacks", &self.callback_count())
            .finish()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Script names must be non-empty and limited to `[A-Za-z0-9_-]`
pub fn is_legal_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
