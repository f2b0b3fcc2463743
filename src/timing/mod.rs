mod live;
mod sequencer;
mod track;

pub use live::{ImmediateQueue, PauseGate, SequencerHandle, SequencerState};
pub use sequencer::{
    DispatchStats, EndReason, RenderThread, RunMode, RunReport, Sequencer, SequencerUpdate,
    spawn_render_thread,
};
pub use track::Track;
