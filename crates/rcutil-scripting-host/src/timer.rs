use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use rcutil_events::{Event, TickPhase, TimerId};

use crate::script::ScriptHandle;

/// Game tick counter
pub type Tick = u64;

/// Type of timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once and is then forgotten
    OneShot,
    /// Fires every `period` ticks under the same identity
    Clock { period: u64 },
}

/// A scheduled timer or clock
#[derive(Debug, Clone)]
pub struct Timer {
    id: TimerId,
    script: ScriptHandle,
    phase: TickPhase,
    kind: TimerKind,
    due_tick: Tick,
}

impl Timer {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// The timed event this timer fires
    pub fn event(&self) -> Event {
        Event::Timed(self.id)
    }

    pub fn script(&self) -> &ScriptHandle {
        &self.script
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn is_clock(&self) -> bool {
        matches!(self.kind, TimerKind::Clock { .. })
    }

    /// Tick this timer is (next) due on
    pub fn due_tick(&self) -> Tick {
        self.due_tick
    }

    /// Ticks left before this timer is due, counted from `now`
    pub fn remaining(&self, now: Tick) -> u64 {
        self.due_tick.saturating_sub(now)
    }
}

#[derive(Default)]
struct SchedulerState {
    tick: Tick,
    next_id: u64,
    timers: HashMap<TimerId, Timer>,
    start: BTreeMap<Tick, BTreeSet<TimerId>>,
    end: BTreeMap<Tick, BTreeSet<TimerId>>,
}

impl SchedulerState {
    fn bucket(&mut self, phase: TickPhase) -> &mut BTreeMap<Tick, BTreeSet<TimerId>> {
        match phase {
            TickPhase::Start => &mut self.start,
            TickPhase::End => &mut self.end,
        }
    }

    fn insert(&mut self, timer: Timer) {
        self.bucket(timer.phase)
            .entry(timer.due_tick)
            .or_default()
            .insert(timer.id);
        self.timers.insert(timer.id, timer);
    }

    fn remove(&mut self, id: TimerId) -> Option<Timer> {
        let timer = self.timers.remove(&id)?;
        let bucket = self.bucket(timer.phase);
        if let Some(ids) = bucket.get_mut(&timer.due_tick) {
            ids.remove(&id);
            if ids.is_empty() {
                bucket.remove(&timer.due_tick);
            }
        }
        Some(timer)
    }
}

/// Owns every pending timer and clock, bucketed by phase and due tick.
///
/// The scheduler's tick only moves on [`TimerScheduler::advance`], so `due`
/// can be called any number of times within one phase.
#[derive(Default)]
pub struct TimerScheduler {
    state: Mutex<SchedulerState>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler whose clock starts at `tick`
    pub fn starting_at(tick: Tick) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                tick,
                ..Default::default()
            }),
        }
    }

    /// Reserve an identity for a timer that is about to be scheduled
    pub fn next_id(&self) -> TimerId {
        let mut state = self.lock();
        let id = TimerId::new(state.next_id);
        state.next_id += 1;
        id
    }

    /// Schedule `id` to fire `delay` ticks from now in `phase`.
    ///
    /// Returns `None` without scheduling anything when the due tick does not
    /// fit in a [`Tick`].
    pub fn schedule(
        &self,
        id: TimerId,
        script: ScriptHandle,
        phase: TickPhase,
        delay: u64,
        kind: TimerKind,
    ) -> Option<Timer> {
        let mut state = self.lock();
        let timer = Timer {
            id,
            script,
            phase,
            kind,
            due_tick: state.tick.checked_add(delay)?,
        };
        state.insert(timer.clone());
        Some(timer)
    }

    /// Remove and return every timer due in `phase` at the current tick.
    ///
    /// Clocks are put back for their next cycle before this returns. A clock
    /// whose next cycle would overflow the tick counter is retired instead.
    pub fn due(&self, phase: TickPhase) -> Vec<Timer> {
        let mut state = self.lock();
        let now = state.tick;

        let mut ids = Vec::new();
        let bucket = state.bucket(phase);
        while let Some(entry) = bucket.first_entry() {
            if *entry.key() > now {
                break;
            }
            ids.extend(entry.remove());
        }

        let mut fired = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(timer) = state.timers.remove(&id) else {
                continue;
            };
            if let TimerKind::Clock { period } = timer.kind {
                if let Some(next) = Self::reschedule(&timer, now, period) {
                    state.insert(next);
                }
            }
            fired.push(timer);
        }
        fired
    }

    fn reschedule(clock: &Timer, now: Tick, period: u64) -> Option<Timer> {
        Some(Timer {
            due_tick: now.checked_add(period)?,
            ..clock.clone()
        })
    }

    /// Cancel a pending timer
    pub fn cancel(&self, id: TimerId) -> Option<Timer> {
        self.lock().remove(id)
    }

    /// Cancel every pending timer owned by `script`.
    ///
    /// Ownership is by handle, so a script registered later under the same
    /// name keeps its timers.
    pub fn cancel_owned_by(&self, script: &ScriptHandle) -> Vec<Timer> {
        let mut state = self.lock();
        let ids: Vec<TimerId> = state
            .timers
            .values()
            .filter(|timer| Arc::ptr_eq(&timer.script, script))
            .map(|timer| timer.id)
            .collect();
        ids.into_iter().filter_map(|id| state.remove(id)).collect()
    }

    pub fn get(&self, id: TimerId) -> Option<Timer> {
        self.lock().timers.get(&id).cloned()
    }

    /// Move on to the next tick
    pub fn advance(&self) -> Tick {
        let mut state = self.lock();
        state.tick += 1;
        state.tick
    }

    pub fn current_tick(&self) -> Tick {
        self.lock().tick
    }

    /// Get the number of pending timers and clocks
    pub fn pending_count(&self) -> usize {
        self.lock().timers.len()
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
