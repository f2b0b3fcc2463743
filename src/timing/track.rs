use std::sync::Arc;

use crate::events::Event;

/// One independent timeline of events, kept sorted by start time.
///
/// Event times are relative to the track's origin, the global sample at which the
/// track was last started. Equal start times keep insertion order.
#[derive(Debug, Clone)]
pub struct Track {
    number: u16,
    events: Vec<Arc<Event>>,
    cursor: usize,
    /// Position just past the previous insertion; near-sequential loading stays O(1).
    insert_hint: usize,
    length: u64,
    origin: u64,
    loop_count: u32,
    loops_left: u32,
    active: bool,
    finished: bool,
}

impl Track {
    pub fn new(number: u16) -> Self {
        Self {
            number,
            events: Vec::new(),
            cursor: 0,
            insert_hint: 0,
            length: 0,
            origin: 0,
            loop_count: 0,
            loops_left: 0,
            active: false,
            finished: false,
        }
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Samples covered by the events, i.e. the latest `start + duration`.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Extra passes after the first one. 0 disables looping.
    pub fn set_loop_count(&mut self, count: u32) {
        self.loop_count = count;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|e| e.as_ref())
    }

    pub fn add_event(&mut self, event: Event) {
        let start = event.start;
        let len = self.events.len();
        let mut pos = self.insert_hint.min(len);
        while pos > 0 && self.events[pos - 1].start > start {
            pos -= 1;
        }
        while pos < len && self.events[pos].start <= start {
            pos += 1;
        }

        self.length = self.length.max(event.end());
        self.events.insert(pos, Arc::new(event));
        self.insert_hint = pos + 1;
        if pos < self.cursor {
            self.cursor += 1;
        }
    }

    /// Removes all events; loop settings are kept.
    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
        self.insert_hint = 0;
        self.length = 0;
    }

    /// Starts playback with track time 0 at global sample `origin`, skipping events
    /// that start before track time `from`.
    pub fn start(&mut self, origin: u64, from: u64) {
        self.origin = origin;
        self.cursor = self.events.partition_point(|e| e.start < from);
        self.loops_left = self.loop_count;
        self.active = true;
        self.finished = false;
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.finished = true;
    }

    /// The next event due at or before `now`, advancing past it.
    pub fn next_event(&mut self, now: u64) -> Option<Arc<Event>> {
        if !self.active {
            return None;
        }
        let event = self.events.get(self.cursor)?;
        if self.origin.saturating_add(event.start) > now {
            return None;
        }
        self.cursor += 1;
        Some(event.clone())
    }

    /// Every event due at or before `now` that has not been returned yet.
    pub fn due_events(&mut self, now: u64) -> impl Iterator<Item = Arc<Event>> + '_ {
        std::iter::from_fn(move || self.next_event(now))
    }

    /// Whether the track still has work after the events due at `now` were taken.
    /// An exhausted track rewinds for its next loop pass or finishes.
    pub fn tick(&mut self, now: u64) -> bool {
        if !self.active {
            return false;
        }
        if self.cursor < self.events.len() {
            return true;
        }
        if self.loops_left > 0 {
            let period = self.length.max(1);
            if now + 1 >= self.origin + period {
                self.origin += period;
                self.cursor = 0;
                self.loops_left -= 1;
            }
            return true;
        }
        self.stop();
        false
    }
}
