// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hashed timing wheel with millisecond deadlines and a ~100 ms tick.
//!
//! The wheel is single-threaded: the event loop advances it from its poll
//! timeout and drains expirations in the same pass that handles socket
//! readiness, so timer callbacks and message handlers never race.
//!
//! Handles are generation-guarded. `stop` is idempotent, a stopped timer
//! never fires, and restarting a running timer first cancels it. A handle
//! that outlives its entry (one-shot already fired, or stopped) simply no
//! longer matches any live generation.

/// Default tick granularity in milliseconds.
pub const TICK_MS: u64 = 100;

/// Default number of wheel slots.
const DEFAULT_SLOTS: usize = 512;

/// Opaque timer handle owned by the context that armed it.
///
/// `Tmr::unarmed()` is the prepared-but-idle state; `start` rebinds the
/// handle to a fresh wheel entry each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tmr {
    index: u32,
    generation: u32,
}

impl Tmr {
    pub const fn unarmed() -> Self {
        Tmr { index: u32::MAX, generation: 0 }
    }
}

impl Default for Tmr {
    fn default() -> Self {
        Tmr::unarmed()
    }
}

struct Entry<T> {
    generation: u32,
    deadline_ms: u64,
    period_ms: Option<u64>,
    payload: Option<T>,
    running: bool,
}

/// The wheel. `T` is the expiration payload delivered from [`TimerWheel::tick`].
pub struct TimerWheel<T> {
    granularity_ms: u64,
    slots: Vec<Vec<(u32, u32)>>,
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    /// Wall time of the last `tick`, used when arming deadlines.
    now_ms: u64,
    /// Count of whole granularity periods processed so far.
    tick_count: u64,
    armed: usize,
}

impl<T: Clone> TimerWheel<T> {
    pub fn new() -> Self {
        Self::with_granularity(TICK_MS)
    }

    pub fn with_granularity(granularity_ms: u64) -> Self {
        TimerWheel {
            granularity_ms: granularity_ms.max(1),
            slots: (0..DEFAULT_SLOTS).map(|_| Vec::new()).collect(),
            entries: Vec::new(),
            free: Vec::new(),
            now_ms: 0,
            tick_count: 0,
            armed: 0,
        }
    }

    /// Number of currently armed timers.
    pub fn armed(&self) -> usize {
        self.armed
    }

    /// Reset a handle to the idle state, cancelling it if it is running.
    pub fn prepare(&mut self, tmr: &mut Tmr) {
        self.stop(tmr);
        *tmr = Tmr::unarmed();
    }

    /// Arm `tmr` to fire `payload` after `duration_ms`. A running handle is
    /// cancelled first. `periodic` re-arms with the same duration on fire.
    pub fn start(&mut self, tmr: &mut Tmr, duration_ms: u64, periodic: bool, payload: T) {
        self.stop(tmr);

        let deadline_ms = self.now_ms + duration_ms.max(1);
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    deadline_ms: 0,
                    period_ms: None,
                    payload: None,
                    running: false,
                });
                (self.entries.len() - 1) as u32
            }
        };

        let entry = &mut self.entries[index as usize];
        entry.generation = entry.generation.wrapping_add(1);
        entry.deadline_ms = deadline_ms;
        entry.period_ms = if periodic { Some(duration_ms.max(1)) } else { None };
        entry.payload = Some(payload);
        entry.running = true;

        let generation = entry.generation;
        let slot = self.slot_of(deadline_ms);
        self.slots[slot].push((index, generation));
        self.armed += 1;

        *tmr = Tmr { index, generation };
    }

    /// Cancel `tmr`. Idempotent; a stale handle is a no-op.
    pub fn stop(&mut self, tmr: &mut Tmr) {
        if let Some(entry) = self.live_entry_mut(tmr) {
            entry.running = false;
            entry.payload = None;
            // Bump so the slot reference left behind can never match again.
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(tmr.index);
            self.armed -= 1;
        }
        *tmr = Tmr::unarmed();
    }

    /// Whether `tmr` refers to a live, armed entry.
    pub fn is_running(&self, tmr: &Tmr) -> bool {
        let Some(entry) = self.entries.get(tmr.index as usize) else {
            return false;
        };
        entry.running && entry.generation == tmr.generation
    }

    /// Advance wheel time to `now_ms` and collect every expiration due.
    ///
    /// Expirations are delivered in deadline order per slot pass. Periodic
    /// entries are re-armed relative to their previous deadline so the
    /// cadence does not drift with tick jitter.
    pub fn tick(&mut self, now_ms: u64) -> Vec<T> {
        let mut fired = Vec::new();
        if now_ms <= self.now_ms {
            return fired;
        }
        self.now_ms = now_ms;

        let granularity = self.granularity_ms;
        let num_slots = self.slots.len() as u64;
        let target = now_ms / granularity;
        while self.tick_count < target {
            self.tick_count += 1;
            let wheel_time = granularity * self.tick_count;
            let cursor = (self.tick_count % num_slots) as usize;

            let mut slot = std::mem::take(&mut self.slots[cursor]);
            let mut retained = Vec::new();
            for (index, generation) in slot.drain(..) {
                let entry = &mut self.entries[index as usize];
                if !entry.running || entry.generation != generation {
                    // Cancelled after scheduling; drop the stale reference.
                    continue;
                }
                if wheel_time < entry.deadline_ms {
                    // Future rotation.
                    retained.push((index, generation));
                    continue;
                }

                match entry.period_ms {
                    Some(period) => {
                        if let Some(payload) = entry.payload.clone() {
                            fired.push(payload);
                        }
                        entry.deadline_ms += period;
                        let next_slot =
                            (entry.deadline_ms.div_ceil(granularity) % num_slots) as usize;
                        if next_slot == cursor {
                            retained.push((index, generation));
                        } else {
                            self.slots[next_slot].push((index, generation));
                        }
                    }
                    None => {
                        if let Some(payload) = entry.payload.take() {
                            fired.push(payload);
                        }
                        entry.running = false;
                        entry.generation = entry.generation.wrapping_add(1);
                        self.free.push(index);
                        self.armed -= 1;
                    }
                }
            }
            self.slots[cursor].extend(retained);
        }
        fired
    }

    // A deadline belongs to the tick on which it becomes due, hence div_ceil:
    // the cursor visits slot ceil(t/granularity) when tick_count reaches it.
    fn slot_of(&self, deadline_ms: u64) -> usize {
        (deadline_ms.div_ceil(self.granularity_ms) % self.slots.len() as u64) as usize
    }

    fn live_entry_mut(&mut self, tmr: &Tmr) -> Option<&mut Entry<T>> {
        let entry = self.entries.get_mut(tmr.index as usize)?;
        if entry.running && entry.generation == tmr.generation {
            Some(entry)
        } else {
            None
        }
    }
}

impl<T: Clone> Default for TimerWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}
