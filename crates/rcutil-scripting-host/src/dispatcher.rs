//! Event and timer dispatch.
//!
//! [`EventDispatcher`] owns the script registry, the subscription index and the
//! timer scheduler, and is the only thing the host tick loop and the command
//! handlers talk to. Share it behind an `Arc`; every method takes `&self`.

use std::panic::{self, AssertUnwindSafe};

use rcutil_events::{Event, FixedEvent, TickPhase, TimerId};
use serde_json::{Map, Value};
use tracing::{debug, error, trace, warn};

use crate::error::{ProtocolError, TransportError};
use crate::registry::ScriptRegistry;
use crate::script::{Script, ScriptHandle};
use crate::timer::{Tick, Timer, TimerKind, TimerScheduler};
use crate::transport::Transport;

/// Arguments for callbacks that take none
pub fn no_args() -> Value {
    Value::Object(Map::new())
}

pub struct EventDispatcher<T> {
    registry: ScriptRegistry,
    scheduler: TimerScheduler,
    transport: T,
}

impl<T: Transport> EventDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self::with_scheduler(transport, TimerScheduler::new())
    }

    pub fn with_scheduler(transport: T, scheduler: TimerScheduler) -> Self {
        Self {
            registry: ScriptRegistry::new(),
            scheduler,
            transport,
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &TimerScheduler {
        &self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Current game tick as seen by the timer scheduler
    pub fn current_tick(&self) -> Tick {
        self.scheduler.current_tick()
    }

    // ===== Scripts =====

    pub fn register_script(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<ScriptHandle, ProtocolError> {
        self.registry
            .add_script(Script::new(name, description, address))
    }

    pub fn script(&self, name: &str) -> Result<ScriptHandle, ProtocolError> {
        self.registry
            .script(name)
            .ok_or(ProtocolError::SCRIPT_NOT_FOUND)
    }

    /// Remove a script with all its callbacks, subscriptions and pending timers
    pub fn remove_script(&self, name: &str) -> Result<ScriptHandle, ProtocolError> {
        let (script, events) = self.registry.remove_script(name)?;
        self.cancel_timers(&events);
        self.scheduler.cancel_owned_by(&script);
        Ok(script)
    }

    // ===== Callbacks =====

    pub fn register_callback(
        &self,
        script: &ScriptHandle,
        event: Event,
        callback: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let callback = callback.into();
        self.registry.register_callback(script, event, callback.as_str())?;
        debug!(target: "scripting", "{} registered {} for {}", script, callback, event);
        Ok(())
    }

    /// Remove one callback. For a timed event the pending timer goes with it.
    pub fn deregister_callback(
        &self,
        script: &ScriptHandle,
        event: &Event,
    ) -> Result<(), ProtocolError> {
        self.registry.deregister_callback(script, event)?;
        if let Event::Timed(id) = event {
            self.scheduler.cancel(*id);
        }
        debug!(target: "scripting", "{} deregistered {}", script, event);
        Ok(())
    }

    /// Remove every callback `script` owns, e.g. after it disconnects
    pub fn deregister_all_callbacks(&self, script: &ScriptHandle) {
        let events = self.registry.deregister_all_callbacks(script);
        self.cancel_timers(&events);
        debug!(target: "scripting", "{} deregistered all {} callbacks", script, events.len());
    }

    fn cancel_timers(&self, events: &[Event]) {
        for id in events.iter().filter_map(Event::as_timer) {
            self.scheduler.cancel(id);
        }
    }

    // ===== Timers =====

    /// Schedule a one-shot timer that fires `delay` ticks from now in `phase`.
    ///
    /// A delay that runs past the last representable tick is rejected with
    /// `ILLEGAL_ARGUMENT`.
    pub fn schedule_timer(
        &self,
        script: &ScriptHandle,
        phase: TickPhase,
        delay: u64,
        callback: impl Into<String>,
    ) -> Result<TimerId, ProtocolError> {
        self.schedule(script, phase, delay, TimerKind::OneShot, callback.into())
    }

    /// Schedule a clock that first fires `delay` ticks from now, then every
    /// `period` ticks, always in `phase`
    pub fn schedule_clock(
        &self,
        script: &ScriptHandle,
        phase: TickPhase,
        delay: u64,
        period: u64,
        callback: impl Into<String>,
    ) -> Result<TimerId, ProtocolError> {
        if period == 0 {
            return Err(ProtocolError::ILLEGAL_ARGUMENT);
        }
        self.schedule(script, phase, delay, TimerKind::Clock { period }, callback.into())
    }

    fn schedule(
        &self,
        script: &ScriptHandle,
        phase: TickPhase,
        delay: u64,
        kind: TimerKind,
        callback: String,
    ) -> Result<TimerId, ProtocolError> {
        // The callback exists before the timer can come due
        let id = self.scheduler.next_id();
        self.registry
            .register_callback(script, Event::Timed(id), callback)?;
        let Some(timer) = self
            .scheduler
            .schedule(id, script.clone(), phase, delay, kind)
        else {
            let _ = self.registry.deregister_callback(script, &Event::Timed(id));
            return Err(ProtocolError::ILLEGAL_ARGUMENT);
        };
        if !self.registry.is_registered(script) {
            // Removed while we were scheduling
            self.scheduler.cancel(id);
            return Err(ProtocolError::SCRIPT_NOT_FOUND);
        }
        debug!(
            target: "scripting",
            "{} scheduled {} ({:?}) for tick {} {}",
            script, id, kind, timer.due_tick(), phase
        );
        Ok(id)
    }

    // ===== Dispatch =====

    /// Invoke the callback `script` registered for `event`.
    ///
    /// Protocol errors from the script are returned; any other transport
    /// failure is logged and yields `Ok(None)`.
    pub fn call(
        &self,
        script: &Script,
        event: &Event,
        args: &Value,
    ) -> Result<Option<Value>, ProtocolError> {
        let callback = script
            .callback(event)
            .ok_or(ProtocolError::EVENT_CALLBACK_NOT_REGISTERED)?;

        trace!(target: "scripting", "Calling {}.{} for {}", script, callback, event);
        match self.transport.invoke(script.address(), &callback, args) {
            Ok(value) => Ok(Some(value)),
            Err(TransportError::Protocol(e)) => Err(e),
            Err(TransportError::Fault(e)) => {
                error!(
                    target: "scripting",
                    "Internal fault calling {} ({}) of {}: {:#}",
                    callback, event, script, e
                );
                Ok(None)
            }
        }
    }

    /// Like [`call`](Self::call), but protocol errors are logged and dropped
    pub fn call_suppress(&self, script: &Script, event: &Event, args: &Value) -> Option<Value> {
        match self.call(script, event, args) {
            Ok(value) => value,
            Err(e) => {
                if e == ProtocolError::EVENT_CALLBACK_NOT_REGISTERED {
                    debug!(target: "scripting", "{} has no callback for {}", script, event);
                } else {
                    warn!(target: "scripting", "{} failed handling {}: {}", script, event, e);
                }
                None
            }
        }
    }

    /// Deliver `event` to every script currently subscribed to it
    pub fn broadcast(&self, event: FixedEvent, args: &Value) {
        let subscribers = self.registry.subscribers(event);
        let event = Event::Fixed(event);
        for script in subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.call_suppress(&script, &event, args);
            }));
            if let Err(e) = outcome {
                error!(
                    target: "scripting",
                    "Broadcast of {} to {} panicked: {:?}",
                    event, script, e
                );
            }
        }
    }

    // ===== Tick hooks =====

    /// Host hook run before the game processes a tick
    pub fn on_gametick_start(&self) {
        self.broadcast(FixedEvent::OnGametickStart, &no_args());
        self.drain(TickPhase::Start);
    }

    /// Host hook run after the game has processed a tick.
    ///
    /// Start-phase timers that came due during this phase (zero-delay timers
    /// created by end-of-tick callbacks) are dropped without firing.
    pub fn on_gametick_end(&self) {
        self.broadcast(FixedEvent::OnGametickEnd, &no_args());
        self.drain(TickPhase::End);

        for timer in self.scheduler.due(TickPhase::Start) {
            debug!(
                target: "scripting",
                "Dropping {} of {} carried over into the next tick",
                timer.id(), timer.script()
            );
            self.release(&timer);
        }

        let tick = self.scheduler.advance();
        trace!(target: "scripting", "Advanced to tick {}", tick);
    }

    /// Fire due timers for `phase` until no more come due.
    ///
    /// There is no cap: a callback that keeps scheduling zero-delay timers for
    /// the same phase keeps this loop going.
    fn drain(&self, phase: TickPhase) {
        let args = no_args();
        loop {
            let timers = self.scheduler.due(phase);
            if timers.is_empty() {
                break;
            }
            for timer in timers {
                let event = timer.event();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.call_suppress(timer.script(), &event, &args);
                }));
                if let Err(e) = outcome {
                    error!(
                        target: "scripting",
                        "Firing {} of {} panicked: {:?}",
                        timer.id(), timer.script(), e
                    );
                }
                // One-shots, and clocks retired or cancelled while firing
                if !timer.is_clock() || self.scheduler.get(timer.id()).is_none() {
                    self.release(&timer);
                }
            }
        }
    }

    /// Forget a timer: its callback entry and, for a clock, its next cycle
    fn release(&self, timer: &Timer) {
        let event = timer.event();
        if self.registry.deregister_callback(timer.script(), &event).is_err() {
            trace!(target: "scripting", "{} already released {}", timer.script(), event);
        }
        self.scheduler.cancel(timer.id());
    }
}
