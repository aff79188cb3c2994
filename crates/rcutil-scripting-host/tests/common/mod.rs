// Shared helpers for dispatcher integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rcutil_scripting_host::{EventDispatcher, Transport, TransportError};
use serde_json::Value;

type Handler = Arc<dyn Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync>;

/// Transport that records every call and answers through per-method handlers.
/// Methods without a handler answer with an empty object.
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(
        &self,
        method: &str,
        handler: impl Fn(&str, &Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) {
        self.handlers
            .lock()
            .unwrap()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Every (address, method) pair invoked so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, m)| m == method)
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Transport for MockTransport {
    fn invoke(&self, address: &str, method: &str, args: &Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), method.to_string()));
        let handler = self.handlers.lock().unwrap().get(method).cloned();
        match handler {
            Some(handler) => handler(address, args),
            None => Ok(Value::Object(Default::default())),
        }
    }
}

pub type TestDispatcher = EventDispatcher<Arc<MockTransport>>;

pub fn setup() -> (Arc<TestDispatcher>, Arc<MockTransport>) {
    let transport = MockTransport::new();
    let dispatcher = Arc::new(EventDispatcher::new(transport.clone()));
    (dispatcher, transport)
}

/// Run one full tick through both phases
pub fn run_tick(dispatcher: &TestDispatcher) {
    dispatcher.on_gametick_start();
    dispatcher.on_gametick_end();
}
