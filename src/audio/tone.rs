use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::instrument::{
    Instrument, InstrumentDescriptor, InstrumentError, InstrumentType, MixOutput, Template,
};
use super::midi_to_freq;
use crate::config::Settings;
use crate::events::Event;

pub const TONE_TYPE: &str = "tone";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Wave {
    Sine,
    Square,
    Saw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscConfig {
    pub wave: Wave,
    pub gain: f32,
    pub semitone: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsrConfig {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToneTemplate {
    pub oscillators: Vec<OscConfig>,
    pub adsr: AdsrConfig,
}

impl Default for ToneTemplate {
    fn default() -> Self {
        Self {
            oscillators: vec![OscConfig {
                wave: Wave::Sine,
                gain: 0.5,
                semitone: 0,
            }],
            adsr: AdsrConfig {
                attack: 0.01,
                decay: 0.05,
                sustain: 0.8,
                release: 0.1,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EnvelopeState {
    Idle,
    Attack { time: f32 },
    Decay { time: f32 },
    Sustain,
    Release { time: f32, from: f32 },
}

/// Oscillator bank shaped by an ADSR envelope.
pub struct ToneInstrument {
    template: ToneTemplate,
    dt: f32,
    sample_rate: f32,
    phases: Vec<f32>,
    envelope: EnvelopeState,
    level: f32,
    pitch: f32,
    detune: f32,
    volume: f32,
    channel: u16,
}

impl ToneInstrument {
    pub fn new(template: ToneTemplate, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        Self {
            phases: vec![0.0; template.oscillators.len()],
            template,
            dt: 1.0 / sample_rate,
            sample_rate,
            envelope: EnvelopeState::Idle,
            level: 0.0,
            pitch: 60.0,
            detune: 0.0,
            volume: 1.0,
            channel: 0,
        }
    }

    fn apply(&mut self, event: &Event) {
        self.pitch = event.pitch;
        self.volume = event.volume;
        self.channel = event.channel;
        if let Some(detune) = event.param("detune") {
            self.detune = detune;
        }
    }

    fn envelope_level(&self) -> f32 {
        let adsr = &self.template.adsr;
        match self.envelope {
            EnvelopeState::Idle => 0.0,
            EnvelopeState::Attack { time } => {
                if adsr.attack == 0.0 {
                    1.0
                } else {
                    (time / adsr.attack).min(1.0)
                }
            }
            EnvelopeState::Decay { time } => {
                let progress = if adsr.decay == 0.0 {
                    1.0
                } else {
                    (time / adsr.decay).min(1.0)
                };
                1.0 - (1.0 - adsr.sustain) * progress
            }
            EnvelopeState::Sustain => adsr.sustain,
            EnvelopeState::Release { time, from } => {
                let progress = if adsr.release == 0.0 {
                    1.0
                } else {
                    (time / adsr.release).min(1.0)
                };
                from * (1.0 - progress)
            }
        }
    }

    fn advance_envelope(&mut self) {
        let adsr = &self.template.adsr;
        let dt = self.dt;
        self.envelope = match self.envelope {
            EnvelopeState::Attack { time } if time + dt >= adsr.attack => {
                EnvelopeState::Decay { time: 0.0 }
            }
            EnvelopeState::Attack { time } => EnvelopeState::Attack { time: time + dt },
            EnvelopeState::Decay { time } if time + dt >= adsr.decay => EnvelopeState::Sustain,
            EnvelopeState::Decay { time } => EnvelopeState::Decay { time: time + dt },
            EnvelopeState::Release { time, from } => EnvelopeState::Release {
                time: time + dt,
                from,
            },
            other => other,
        };
        self.level = self.envelope_level();
    }
}

impl Instrument for ToneInstrument {
    fn start(&mut self, event: &Event) {
        self.apply(event);
        self.phases.iter_mut().for_each(|p| *p = 0.0);
        self.envelope = EnvelopeState::Attack { time: 0.0 };
        self.level = self.envelope_level();
    }

    fn param(&mut self, event: &Event) {
        self.apply(event);
    }

    fn stop(&mut self) {
        if !matches!(self.envelope, EnvelopeState::Release { .. }) {
            self.envelope = EnvelopeState::Release {
                time: 0.0,
                from: self.level,
            };
        }
    }

    fn tick(&mut self, out: &mut dyn MixOutput) {
        if self.envelope == EnvelopeState::Idle {
            return;
        }
        let mut sample = 0.0;
        for (osc, phase) in self.template.oscillators.iter().zip(self.phases.iter_mut()) {
            let value = match osc.wave {
                Wave::Sine => (*phase * 2.0 * std::f32::consts::PI).sin(),
                Wave::Square => {
                    if *phase < 0.5 {
                        -1.0
                    } else {
                        1.0
                    }
                }
                Wave::Saw => *phase * 2.0 - 1.0,
            };
            sample += value * osc.gain;

            let freq = midi_to_freq(self.pitch + osc.semitone as f32 + self.detune);
            *phase += freq / self.sample_rate;
            if *phase >= 1.0 {
                *phase -= 1.0;
            }
        }
        out.output(self.channel, sample * self.level * self.volume);
        self.advance_envelope();
    }

    fn is_finished(&self) -> bool {
        match self.envelope {
            EnvelopeState::Idle => true,
            EnvelopeState::Release { time, .. } => time >= self.template.adsr.release,
            _ => false,
        }
    }
}

/// The `tone` instrument type. Descriptors carry a `ToneTemplate`.
pub fn tone_type() -> InstrumentType {
    InstrumentType::new(
        TONE_TYPE,
        Arc::new(|desc: &InstrumentDescriptor, settings: &Settings| {
            let template = match (&desc.template, desc.template::<ToneTemplate>()) {
                (None, _) => ToneTemplate::default(),
                (Some(_), Some(t)) => t.clone(),
                (Some(_), None) => return Err(InstrumentError::TemplateMismatch(desc.number)),
            };
            Ok(Box::new(ToneInstrument::new(template, settings.sample_rate)) as Box<dyn Instrument>)
        }),
    )
    .with_event_factory(Arc::new(|desc: &InstrumentDescriptor| {
        Event {
            instrument: desc.number,
            ..Event::default()
        }
        .with_param("detune", 0.0)
    }))
    .with_templates(Arc::new(|| Arc::new(ToneTemplate::default()) as Template), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        samples: Vec<(u16, f32)>,
    }

    impl MixOutput for Capture {
        fn output(&mut self, channel: u16, value: f32) {
            self.samples.push((channel, value));
        }
        fn output2(&mut self, channel: u16, left: f32, _right: f32) {
            self.samples.push((channel, left));
        }
        fn fx_send(&mut self, _unit: u16, _value: f32) {}
    }

    fn template(release: f32) -> ToneTemplate {
        ToneTemplate {
            oscillators: vec![OscConfig {
                wave: Wave::Square,
                gain: 1.0,
                semitone: 0,
            }],
            adsr: AdsrConfig {
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release,
            },
        }
    }

    #[test]
    fn idle_until_started() {
        let inst = ToneInstrument::new(template(0.0), 100);
        assert!(inst.is_finished());
    }

    #[test]
    fn renders_on_event_channel() {
        let mut inst = ToneInstrument::new(template(0.0), 1000);
        inst.start(&Event::default().on_channel(3).with_volume(0.5));
        let mut cap = Capture::default();
        inst.tick(&mut cap);
        assert_eq!(cap.samples, vec![(3, -0.5)]);
        assert!(!inst.is_finished());
    }

    #[test]
    fn release_runs_for_configured_time() {
        let mut inst = ToneInstrument::new(template(0.01), 1000);
        inst.start(&Event::default());
        let mut cap = Capture::default();
        for _ in 0..5 {
            inst.tick(&mut cap);
        }
        inst.stop();
        let mut ticks = 0;
        while !inst.is_finished() {
            inst.tick(&mut cap);
            ticks += 1;
            assert!(ticks < 100);
        }
        assert!((9..=11).contains(&ticks));
        let last = cap.samples.last().unwrap().1.abs();
        assert!(last < 0.2);
    }

    #[test]
    fn zero_release_finishes_on_stop() {
        let mut inst = ToneInstrument::new(template(0.0), 1000);
        inst.start(&Event::default());
        inst.stop();
        assert!(inst.is_finished());
    }

    #[test]
    fn factory_rejects_foreign_template() {
        let kind = Arc::new(tone_type());
        let desc = InstrumentDescriptor {
            number: crate::events::InstrumentId(1),
            name: "bad".into(),
            description: String::new(),
            kind: kind.clone(),
            template: Some(Arc::new(1u8)),
        };
        let result = (kind.instance_factory)(&desc, &Settings::default());
        assert!(matches!(result, Err(InstrumentError::TemplateMismatch(_))));
    }

    #[test]
    fn event_factory_adds_detune() {
        let kind = Arc::new(tone_type());
        let desc = InstrumentDescriptor {
            number: crate::events::InstrumentId(5),
            name: "t".into(),
            description: String::new(),
            kind: kind.clone(),
            template: None,
        };
        let ev = (kind.event_factory)(&desc);
        assert_eq!(ev.param("detune"), Some(0.0));
    }
}
