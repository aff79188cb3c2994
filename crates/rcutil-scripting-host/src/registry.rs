use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use rcutil_events::{Event, FixedEvent};
use tracing::debug;

use crate::error::ProtocolError;
use crate::script::{is_legal_name, Script, ScriptHandle};

type Subscriptions = HashMap<FixedEvent, HashSet<ScriptHandle>>;

/// Registered scripts plus the fixed-event subscription index.
///
/// Lock order is always subscriptions, then scripts, then a script's own
/// callback map. Every operation that touches more than one of them holds the
/// subscription lock for its whole duration, so a broadcast snapshot sees a
/// script either fully registered or fully removed.
#[derive(Default)]
pub struct ScriptRegistry {
    subscriptions: Mutex<Subscriptions>,
    scripts: RwLock<HashMap<String, ScriptHandle>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Scripts =====

    /// Add a new script under its name
    pub fn add_script(&self, script: Script) -> Result<ScriptHandle, ProtocolError> {
        if !is_legal_name(script.name()) {
            return Err(ProtocolError::ILLEGAL_NAME);
        }

        let mut scripts = self.scripts.write().unwrap_or_else(|p| p.into_inner());
        if scripts.contains_key(script.name()) {
            return Err(ProtocolError::NAME_EXISTS);
        }

        let handle = Arc::new(script);
        scripts.insert(handle.name().to_string(), handle.clone());
        debug!(target: "scripting", "Registered script {} at {}", handle.name(), handle.address());
        Ok(handle)
    }

    pub fn script(&self, name: &str) -> Option<ScriptHandle> {
        self.scripts
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
    }

    pub fn script_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scripts
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn script_count(&self) -> usize {
        self.scripts.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Remove a script together with all of its callbacks and subscriptions.
    ///
    /// Returns the removed handle and the events it had callbacks for.
    pub fn remove_script(&self, name: &str) -> Result<(ScriptHandle, Vec<Event>), ProtocolError> {
        let mut subscriptions = self.lock_subscriptions();
        let script = self
            .scripts
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(name)
            .ok_or(ProtocolError::SCRIPT_NOT_FOUND)?;
        let events = Self::clear_script(&mut subscriptions, &script);
        debug!(target: "scripting", "Removed script {} ({} callbacks)", name, events.len());
        Ok((script, events))
    }

    // ===== Callbacks =====

    pub fn register_callback(
        &self,
        script: &ScriptHandle,
        event: Event,
        callback: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let mut subscriptions = self.lock_subscriptions();
        if !self.is_registered(script) {
            return Err(ProtocolError::SCRIPT_NOT_FOUND);
        }

        script.register_callback(event, callback)?;
        if let Event::Fixed(fixed) = event {
            subscriptions
                .entry(fixed)
                .or_default()
                .insert(script.clone());
        }
        Ok(())
    }

    pub fn deregister_callback(
        &self,
        script: &ScriptHandle,
        event: &Event,
    ) -> Result<(), ProtocolError> {
        let mut subscriptions = self.lock_subscriptions();
        script.deregister_callback(event)?;
        if let Event::Fixed(fixed) = event {
            Self::unsubscribe(&mut subscriptions, *fixed, script);
        }
        Ok(())
    }

    /// Drop every callback `script` owns, returning the events that had one
    pub fn deregister_all_callbacks(&self, script: &ScriptHandle) -> Vec<Event> {
        let mut subscriptions = self.lock_subscriptions();
        Self::clear_script(&mut subscriptions, script)
    }

    // ===== Subscriptions =====

    /// Point-in-time copy of the scripts subscribed to `event`
    pub fn subscribers(&self, event: FixedEvent) -> Vec<ScriptHandle> {
        self.lock_subscriptions()
            .get(&event)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, event: FixedEvent, script: &Script) -> bool {
        self.lock_subscriptions()
            .get(&event)
            .is_some_and(|set| set.iter().any(|s| s.as_ref() == script))
    }

    fn clear_script(subscriptions: &mut Subscriptions, script: &ScriptHandle) -> Vec<Event> {
        let events = script.clear_callbacks();
        for event in &events {
            if let Event::Fixed(fixed) = event {
                Self::unsubscribe(subscriptions, *fixed, script);
            }
        }
        events
    }

    fn unsubscribe(subscriptions: &mut Subscriptions, event: FixedEvent, script: &ScriptHandle) {
        if let Some(set) = subscriptions.get_mut(&event) {
            set.remove(script);
            if set.is_empty() {
                subscriptions.remove(&event);
            }
        }
    }

    /// Whether `script` is the handle currently registered under its name
    pub fn is_registered(&self, script: &ScriptHandle) -> bool {
        self.scripts
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(script.name())
            .is_some_and(|current| Arc::ptr_eq(current, script))
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}
