/// Core event types for rcutil
///
/// This crate provides the event vocabulary shared between the dispatch core
/// and anything that talks to it (command handlers, transports, host loops),
/// without pulling in the dispatcher itself.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Tick Phases
// ============================================================================

/// Half of a game tick. The host processes `Start` to completion, then runs
/// the tick's own work, then processes `End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TickPhase {
    Start,
    End,
}

impl TickPhase {
    /// The fixed event broadcast when this phase begins
    pub fn fixed_event(self) -> FixedEvent {
        match self {
            TickPhase::Start => FixedEvent::OnGametickStart,
            TickPhase::End => FixedEvent::OnGametickEnd,
        }
    }
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickPhase::Start => write!(f, "start"),
            TickPhase::End => write!(f, "end"),
        }
    }
}

// ============================================================================
// Fixed Events
// ============================================================================

/// Closed set of lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FixedEvent {
    /// Sent to a script once it has connected and registered
    #[serde(rename = "onScriptInitialize")]
    OnScriptInitialize,
    /// Sent to a script when a player runs it
    #[serde(rename = "onScriptRun")]
    OnScriptRun,
    /// Broadcast at the start of every game tick
    #[serde(rename = "onGametickStart")]
    OnGametickStart,
    /// Broadcast at the end of every game tick
    #[serde(rename = "onGametickEnd")]
    OnGametickEnd,
}

impl FixedEvent {
    pub const ALL: [FixedEvent; 4] = [
        FixedEvent::OnScriptInitialize,
        FixedEvent::OnScriptRun,
        FixedEvent::OnGametickStart,
        FixedEvent::OnGametickEnd,
    ];

    /// Name used for this event on the wire
    pub fn name(&self) -> &'static str {
        match self {
            FixedEvent::OnScriptInitialize => "onScriptInitialize",
            FixedEvent::OnScriptRun => "onScriptRun",
            FixedEvent::OnGametickStart => "onGametickStart",
            FixedEvent::OnGametickEnd => "onGametickEnd",
        }
    }
}

impl fmt::Display for FixedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when an event name does not match any known fixed event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for FixedEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FixedEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

// ============================================================================
// Timed Events
// ============================================================================

/// Identity of one scheduled timer or clock.
///
/// Ids are handed out once and never reused, so two timers created with the
/// same parameters still compare unequal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

// ============================================================================
// Event
// ============================================================================

/// Anything a script can attach a callback to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Event {
    /// Lifecycle event shared by every subscriber
    Fixed(FixedEvent),
    /// Event owned by exactly one timer or clock
    Timed(TimerId),
}

impl Event {
    pub fn is_timed(&self) -> bool {
        matches!(self, Event::Timed(_))
    }

    pub fn as_fixed(&self) -> Option<FixedEvent> {
        match self {
            Event::Fixed(event) => Some(*event),
            Event::Timed(_) => None,
        }
    }

    pub fn as_timer(&self) -> Option<TimerId> {
        match self {
            Event::Timed(id) => Some(*id),
            Event::Fixed(_) => None,
        }
    }
}

impl From<FixedEvent> for Event {
    fn from(event: FixedEvent) -> Self {
        Event::Fixed(event)
    }
}

impl From<TimerId> for Event {
    fn from(id: TimerId) -> Self {
        Event::Timed(id)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Fixed(event) => write!(f, "{}", event),
            Event::Timed(id) => write!(f, "{}", id),
        }
    }
}
