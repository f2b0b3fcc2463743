mod instrument;
mod manager;
mod sink;
mod tone;
mod voice;

pub use instrument::{
    EventFactory, InstanceFactory, Instrument, InstrumentDescriptor, InstrumentError,
    InstrumentType, MixOutput, NullInstrument, Template, TemplateDestructor, TemplateFactory,
};
pub use manager::{FIRST_AUTO_NUMBER, InstrumentManager, ManagerError};
pub use sink::{BufferSink, NullSink, OutputSink, RingSink, SinkError, WavSink};
pub use tone::{AdsrConfig, OscConfig, TONE_TYPE, ToneInstrument, ToneTemplate, Wave, tone_type};
pub use voice::{ActiveVoice, VoiceState};

/// Fractional MIDI note number to Hz.
pub fn midi_to_freq(note: f32) -> f32 {
    440.0 * 2.0_f32.powf((note - 69.0) / 12.0)
}
