pub mod audio;
pub mod config;
pub mod control;
pub mod events;
pub mod project;
pub mod timing;

pub use config::{ConfigError, Settings, SharedSettings, WavBits};
pub use control::{ChannelState, Controller};
pub use events::{CorrelationId, Event, EventKind, InstrumentId, Param};
pub use project::{Project, ProjectError};
pub use timing::{
    EndReason, RunMode, RunReport, Sequencer, SequencerHandle, SequencerState, Track,
    spawn_render_thread,
};
