use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::events::Event;

/// FIFO carrying live events from producer threads to the render thread.
#[derive(Debug, Default)]
pub struct ImmediateQueue {
    events: Mutex<VecDeque<Event>>,
    closed: AtomicBool,
}

impl ImmediateQueue {
    /// Appends `event`. Ignored once the queue is closed.
    pub fn push(&self, event: Event) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.events.lock().push_back(event);
        true
    }

    pub fn pop(&self) -> Option<Event> {
        self.events.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.events.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Pause and halt requests. The render thread parks on the condition variable while
/// paused; `halt` and `resume` both wake it.
#[derive(Debug, Default)]
pub struct PauseGate {
    lock: Mutex<()>,
    wake: Condvar,
    paused: AtomicBool,
    halted: AtomicBool,
    parked: AtomicBool,
}

impl PauseGate {
    pub fn pause(&self) {
        let _guard = self.lock.lock();
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        {
            let _guard = self.lock.lock();
            self.paused.store(false, Ordering::Release);
        }
        self.wake.notify_all();
    }

    pub fn halt(&self) {
        {
            let _guard = self.lock.lock();
            self.halted.store(true, Ordering::Release);
        }
        self.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// True while the render thread is blocked in `wait_while_paused`.
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    /// Drops pending pause and halt requests. Called when a run ends so neither
    /// leaks into the next one.
    pub(crate) fn reset(&self) {
        let _guard = self.lock.lock();
        self.paused.store(false, Ordering::Release);
        self.halted.store(false, Ordering::Release);
    }

    /// Blocks while a pause is requested and no halt is. Returns whether it blocked.
    pub fn wait_while_paused(&self) -> bool {
        if !self.is_paused() {
            return false;
        }
        let mut guard = self.lock.lock();
        let mut blocked = false;
        while self.is_paused() && !self.is_halted() {
            if !blocked {
                blocked = true;
                self.parked.store(true, Ordering::Release);
                tracing::debug!("render thread paused");
            }
            self.wake.wait(&mut guard);
        }
        if blocked {
            self.parked.store(false, Ordering::Release);
            tracing::debug!("render thread resumed");
        }
        blocked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Off,
    /// Live input only.
    Play,
    /// Tracks, single pass.
    SequenceOnce,
    /// Tracks and live input.
    SequenceMulti,
}

impl SequencerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SequencerState::Play,
            2 => SequencerState::SequenceOnce,
            3 => SequencerState::SequenceMulti,
            _ => SequencerState::Off,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SequencerState::Off => 0,
            SequencerState::Play => 1,
            SequencerState::SequenceOnce => 2,
            SequencerState::SequenceMulti => 3,
        }
    }
}

/// Everything that crosses the render thread boundary.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) queue: ImmediateQueue,
    pub(crate) gate: PauseGate,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn state(&self) -> SequencerState {
        SequencerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves Off -> `state`. Fails if a run is already in progress.
    pub(crate) fn enter(&self, state: SequencerState) -> bool {
        self.state
            .compare_exchange(
                SequencerState::Off.as_u8(),
                state.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn leave(&self) {
        self.state.store(SequencerState::Off.as_u8(), Ordering::Release);
    }
}

/// Thread-safe control surface of a `Sequencer`.
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    pub(crate) shared: Arc<Shared>,
}

impl SequencerHandle {
    /// Queues an event for the render thread. At most one is consumed per tick.
    /// Silently ignored once the sequencer is gone.
    pub fn push_immediate_event(&self, event: Event) {
        self.shared.queue.push(event);
    }

    pub fn pending_immediate_events(&self) -> usize {
        self.shared.queue.len()
    }

    /// Takes effect at the top of the next tick.
    pub fn pause(&self) {
        self.shared.gate.pause();
    }

    pub fn resume(&self) {
        self.shared.gate.resume();
    }

    /// Stops the current run at the top of its next tick, paused or not. A halt
    /// requested while nothing runs ends the next run immediately. Either way the
    /// pause request is dropped along with the run.
    pub fn halt(&self) {
        self.shared.gate.halt();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.gate.is_paused()
    }

    /// True once the render thread is actually blocked on a pause.
    pub fn is_parked(&self) -> bool {
        self.shared.gate.is_parked()
    }

    /// The running mode. Pausing does not change it: a paused run still reports its
    /// mode, check `is_paused`/`is_parked` for the pause.
    pub fn state(&self) -> SequencerState {
        self.shared.state()
    }
}
