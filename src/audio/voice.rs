use super::instrument::{Instrument, MixOutput};
use crate::events::{CorrelationId, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Sounding,
    /// Stopped, but the instrument may still be producing a tail.
    Releasing,
}

/// A running instrument instance bound to the correlation id that started it.
pub struct ActiveVoice {
    /// `None` once a newer voice has taken over the id.
    pub id: Option<CorrelationId>,
    pub instrument: Box<dyn Instrument>,
    /// Ticks left while sounding; only consulted for track-scheduled voices.
    pub remaining: u64,
    pub state: VoiceState,
    pub channel: u16,
    /// Track voices stop themselves when `remaining` runs out, live voices wait for a stop.
    pub scheduled: bool,
}

impl ActiveVoice {
    /// Binds `instrument` to `event` and calls the instrument's start hook.
    pub fn start(event: &Event, mut instrument: Box<dyn Instrument>, scheduled: bool) -> Self {
        instrument.start(event);
        Self {
            id: Some(event.id),
            instrument,
            remaining: event.duration,
            state: VoiceState::Sounding,
            channel: event.channel,
            scheduled,
        }
    }

    pub fn matches(&self, id: CorrelationId) -> bool {
        self.id == Some(id)
    }

    pub fn restart(&mut self, event: &Event, scheduled: bool) {
        self.instrument.start(event);
        self.remaining = event.duration;
        self.state = VoiceState::Sounding;
        self.channel = event.channel;
        self.scheduled = scheduled;
    }

    pub fn release(&mut self) {
        if self.state == VoiceState::Sounding {
            self.instrument.stop();
            self.state = VoiceState::Releasing;
        }
    }

    /// Releases the voice and gives up its id so it can ring out unmatched.
    pub fn detach(&mut self) {
        self.release();
        self.id = None;
    }

    /// Runs one sample. Returns true once the voice can be deallocated.
    pub fn render(&mut self, out: &mut dyn MixOutput) -> bool {
        if self.scheduled && self.state == VoiceState::Sounding {
            if self.remaining == 0 {
                self.release();
            } else {
                self.remaining -= 1;
            }
        }
        self.instrument.tick(out);
        self.state == VoiceState::Releasing && self.instrument.is_finished()
    }

    pub fn into_instrument(self) -> Box<dyn Instrument> {
        self.instrument
    }
}
