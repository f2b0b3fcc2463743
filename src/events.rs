use serde::{Deserialize, Serialize};

/// Caller-assigned identifier linking a start to later stop/change/restart events.
pub type CorrelationId = u64;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstrumentId(pub i32);

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&format!("#{}", self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    StartSound,
    StopSound,
    ChangeParams,
    RestartSound,
    StartTrack { track: u16 },
    StopTrack { track: u16 },
    ControlChange { control: u16, value: f32 },
}

impl EventKind {
    /// Kinds that only act on an already running voice.
    pub fn targets_voice(&self) -> bool {
        matches!(
            self,
            EventKind::StopSound | EventKind::ChangeParams | EventKind::RestartSound
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub kind: EventKind,
    pub id: CorrelationId,
    pub instrument: InstrumentId,
    /// Owning timeline, 0 is the main track.
    pub track: u16,
    /// Destination mixer input.
    pub channel: u16,
    /// Samples, relative to the owning track's start.
    pub start: u64,
    /// Samples
    pub duration: u64,
    /// MIDI note number, fractional values allowed
    pub pitch: f32,
    /// 0.0 -> 1.0
    pub volume: f32,
    pub params: Vec<Param>,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            kind: EventKind::StartSound,
            id: 0,
            instrument: InstrumentId::default(),
            track: 0,
            channel: 0,
            start: 0,
            duration: 0,
            pitch: 60.0,
            volume: 1.0,
            params: Vec::new(),
        }
    }
}

impl Event {
    pub fn start_sound(
        id: CorrelationId,
        instrument: InstrumentId,
        start: u64,
        duration: u64,
    ) -> Self {
        Self {
            kind: EventKind::StartSound,
            id,
            instrument,
            start,
            duration,
            ..Self::default()
        }
    }

    pub fn stop_sound(id: CorrelationId, start: u64) -> Self {
        Self {
            kind: EventKind::StopSound,
            id,
            start,
            ..Self::default()
        }
    }

    pub fn change_params(id: CorrelationId, start: u64) -> Self {
        Self {
            kind: EventKind::ChangeParams,
            id,
            start,
            ..Self::default()
        }
    }

    pub fn restart_sound(
        id: CorrelationId,
        instrument: InstrumentId,
        start: u64,
        duration: u64,
    ) -> Self {
        Self {
            kind: EventKind::RestartSound,
            ..Self::start_sound(id, instrument, start, duration)
        }
    }

    pub fn start_track(track: u16, start: u64) -> Self {
        Self {
            kind: EventKind::StartTrack { track },
            start,
            ..Self::default()
        }
    }

    pub fn stop_track(track: u16, start: u64) -> Self {
        Self {
            kind: EventKind::StopTrack { track },
            start,
            ..Self::default()
        }
    }

    pub fn control_change(channel: u16, control: u16, value: f32, start: u64) -> Self {
        Self {
            kind: EventKind::ControlChange { control, value },
            channel,
            start,
            ..Self::default()
        }
    }

    pub fn on_track(mut self, track: u16) -> Self {
        self.track = track;
        self
    }

    pub fn on_channel(mut self, channel: u16) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        self.set_param(name, value);
        self
    }

    /// Sample just past the end of the sound, relative to the track start.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.duration)
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.params.iter().find(|p| p.name == name).map(|p| p.value)
    }

    pub fn set_param(&mut self, name: &str, value: f32) {
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(p) => p.value = value,
            None => self.params.push(Param {
                name: name.to_string(),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_ordered_and_overwritten_in_place() {
        let ev = Event::start_sound(1, InstrumentId(3), 0, 10)
            .with_param("detune", 0.5)
            .with_param("cutoff", 1200.0)
            .with_param("detune", -0.25);

        assert_eq!(ev.params.len(), 2);
        assert_eq!(ev.params[0].name, "detune");
        assert_eq!(ev.param("detune"), Some(-0.25));
        assert_eq!(ev.param("cutoff"), Some(1200.0));
        assert_eq!(ev.param("missing"), None);
    }

    #[test]
    fn instrument_id_display_honours_width() {
        assert_eq!(format!("{}", InstrumentId(7)), "#7");
        assert_eq!(format!("{:>6}", InstrumentId(42)), "   #42");
        assert_eq!(format!("{:<5}|", InstrumentId(-1)), "#-1  |");
    }

    #[test]
    fn end_saturates() {
        let ev = Event::start_sound(1, InstrumentId(1), u64::MAX - 1, 10);
        assert_eq!(ev.end(), u64::MAX);
    }

    #[test]
    fn restart_carries_start_fields() {
        let ev = Event::restart_sound(9, InstrumentId(2), 5, 7);
        assert_eq!(ev.kind, EventKind::RestartSound);
        assert_eq!(ev.id, 9);
        assert_eq!(ev.instrument, InstrumentId(2));
        assert_eq!(ev.duration, 7);
        assert!(ev.kind.targets_voice());
        assert!(!EventKind::StartSound.targets_voice());
    }

    #[test]
    fn parses_from_ron_with_defaults() {
        let ev: Event = ron::from_str("(kind: StopSound, id: 4, start: 100)").unwrap();
        assert_eq!(ev.kind, EventKind::StopSound);
        assert_eq!(ev.id, 4);
        assert_eq!(ev.start, 100);
        assert_eq!(ev.volume, 1.0);
        assert!(ev.params.is_empty());
    }
}
