use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::live::{SequencerHandle, SequencerState, Shared};
use super::track::Track;
use crate::audio::{ActiveVoice, InstrumentError, InstrumentManager};
use crate::config::SharedSettings;
use crate::control::Controller;
use crate::events::{CorrelationId, Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Live input only, until halted or `to` is reached.
    Play { to: Option<u64> },
    /// Tracks from track time `from`, ending when they are exhausted and silent.
    SequenceOnce { from: u64, to: Option<u64> },
    /// Tracks plus live input, until halted or `to` is reached.
    SequenceMulti { to: Option<u64> },
}

impl RunMode {
    fn state(&self) -> SequencerState {
        match self {
            RunMode::Play { .. } => SequencerState::Play,
            RunMode::SequenceOnce { .. } => SequencerState::SequenceOnce,
            RunMode::SequenceMulti { .. } => SequencerState::SequenceMulti,
        }
    }

    fn live(&self) -> bool {
        !matches!(self, RunMode::SequenceOnce { .. })
    }

    fn tracks(&self) -> bool {
        !matches!(self, RunMode::Play { .. })
    }

    fn first_sample(&self) -> u64 {
        match self {
            RunMode::SequenceOnce { from, .. } => *from,
            _ => 0,
        }
    }

    fn end_time(&self) -> Option<u64> {
        match self {
            RunMode::Play { to }
            | RunMode::SequenceOnce { to, .. }
            | RunMode::SequenceMulti { to } => *to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Tracks exhausted and every voice finished.
    Completed,
    EndTime,
    Halted,
    /// An instrument instance could not be built.
    AllocationFailed,
    /// The output sink rejected a sample.
    OutputFailed,
    /// Another run was in progress; nothing was rendered.
    AlreadyRunning,
}

/// Occurrence counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub events: u64,
    pub live_events: u64,
    pub voices_started: u64,
    pub voices_restarted: u64,
    pub voices_finished: u64,
    /// Voices still alive when the run ended, deallocated without waiting.
    pub voices_reclaimed: u64,
    /// Voices that lost their id to a newer start with the same id.
    pub voices_detached: u64,
    pub unmatched: u64,
    pub unresolved_instruments: u64,
    pub unknown_tracks: u64,
    pub ignored_track_starts: u64,
    pub dropped_controls: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Ticks rendered.
    pub samples: u64,
    /// Sample counter when the run ended.
    pub end: u64,
    pub reason: EndReason,
    pub stats: DispatchStats,
}

type ProgressCallback = Box<dyn FnMut(u64) + Send>;

/// Sample-accurate event scheduler driving the instrument voices.
///
/// Owned by the render thread; other threads talk to it through a `SequencerHandle`.
pub struct Sequencer {
    manager: InstrumentManager,
    tracks: Vec<Track>,
    voices: Vec<ActiveVoice>,
    shared: Arc<Shared>,
    controller: Option<Box<dyn Controller>>,
    progress: Option<ProgressCallback>,
    progress_interval: u64,
    now: u64,
    started_now: Vec<u16>,
    rescan: bool,
    stats: DispatchStats,
}

impl Sequencer {
    pub fn new(settings: SharedSettings) -> Self {
        Self::with_manager(InstrumentManager::new(settings))
    }

    pub fn with_manager(manager: InstrumentManager) -> Self {
        Self {
            manager,
            tracks: Vec::new(),
            voices: Vec::new(),
            shared: Arc::new(Shared::default()),
            controller: None,
            progress: None,
            progress_interval: 0,
            now: 0,
            started_now: Vec::new(),
            rescan: false,
            stats: DispatchStats::default(),
        }
    }

    pub fn manager(&self) -> &InstrumentManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut InstrumentManager {
        &mut self.manager
    }

    pub fn handle(&self) -> SequencerHandle {
        SequencerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn push_immediate_event(&self, event: Event) {
        self.shared.queue.push(event);
    }

    pub fn set_controller(&mut self, controller: Box<dyn Controller>) {
        self.controller = Some(controller);
    }

    /// Called with the sample counter every `progress_interval` ticks (see `Settings`).
    pub fn set_progress(&mut self, callback: impl FnMut(u64) + Send + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Schedules `event` on the track it names, creating the track if needed.
    pub fn add_event(&mut self, event: Event) {
        self.track_mut(event.track).add_event(event);
    }

    pub fn track(&self, number: u16) -> Option<&Track> {
        self.track_index(number).map(|i| &self.tracks[i])
    }

    /// The track with `number`, created empty if it does not exist.
    pub fn track_mut(&mut self, number: u16) -> &mut Track {
        let i = match self.tracks.binary_search_by_key(&number, |t| t.number()) {
            Ok(i) => i,
            Err(i) => {
                self.tracks.insert(i, Track::new(number));
                i
            }
        };
        &mut self.tracks[i]
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn clear_tracks(&mut self) {
        self.tracks.clear();
    }

    fn track_index(&self, number: u16) -> Option<usize> {
        self.tracks.binary_search_by_key(&number, |t| t.number()).ok()
    }

    /// Current sample counter.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn voice(&self, id: CorrelationId) -> Option<&ActiveVoice> {
        self.voices.iter().find(|v| v.matches(id))
    }

    pub fn voices(&self) -> impl Iterator<Item = &ActiveVoice> {
        self.voices.iter()
    }

    pub fn play(&mut self) -> RunReport {
        self.run(RunMode::Play { to: None })
    }

    pub fn sequence_once(&mut self, from: u64, to: Option<u64>) -> RunReport {
        self.run(RunMode::SequenceOnce { from, to })
    }

    pub fn sequence_multi(&mut self, to: Option<u64>) -> RunReport {
        self.run(RunMode::SequenceMulti { to })
    }

    /// Renders until the mode completes, the end time is reached, a halt is observed
    /// or a fatal error occurs. Blocks the calling thread.
    pub fn run(&mut self, mode: RunMode) -> RunReport {
        if !self.shared.enter(mode.state()) {
            tracing::warn!(?mode, "sequencer already running");
            return RunReport {
                samples: 0,
                end: self.now,
                reason: EndReason::AlreadyRunning,
                stats: DispatchStats::default(),
            };
        }

        self.stats = DispatchStats::default();
        self.now = mode.first_sample();
        self.progress_interval = self.manager.settings().load().progress_interval;
        let unresolved_before = self.manager.unresolved_count();
        let first = self.now;

        for track in &mut self.tracks {
            if mode.tracks() && track.number() == 0 {
                track.start(0, first);
            } else {
                track.stop();
            }
        }
        self.manager.start();
        tracing::info!(?mode, tracks = self.tracks.len(), "sequencer started");

        let mut reason = loop {
            if let Some(reason) = self.tick(mode) {
                break reason;
            }
        };

        self.reclaim_voices();
        if let Err(e) = self.manager.stop() {
            tracing::warn!("failed to finish output: {}", e);
            if !matches!(reason, EndReason::AllocationFailed) {
                reason = EndReason::OutputFailed;
            }
        }
        self.stats.unresolved_instruments = self.manager.unresolved_count() - unresolved_before;
        self.shared.gate.reset();
        self.shared.leave();

        let report = RunReport {
            samples: self.now - first,
            end: self.now,
            reason,
            stats: self.stats.clone(),
        };
        tracing::info!(
            samples = report.samples,
            reason = ?report.reason,
            "sequencer stopped"
        );
        report
    }

    /// One sample. Returns why the run ends, or `None` to keep going.
    fn tick(&mut self, mode: RunMode) -> Option<EndReason> {
        let gate = &self.shared.gate;
        if gate.is_halted() {
            return Some(EndReason::Halted);
        }
        if gate.wait_while_paused() && gate.is_halted() {
            return Some(EndReason::Halted);
        }
        if mode.end_time().is_some_and(|to| self.now >= to) {
            return Some(EndReason::EndTime);
        }
        self.started_now.clear();

        if mode.live() {
            if let Some(event) = self.shared.queue.pop() {
                self.stats.live_events += 1;
                if let Err(e) = self.dispatch(&event, false) {
                    return Some(self.allocation_failed(e));
                }
            }
        }

        let mut pending = false;
        if mode.tracks() {
            loop {
                self.rescan = false;
                for i in 0..self.tracks.len() {
                    while let Some(event) = self.tracks[i].next_event(self.now) {
                        if let Err(e) = self.dispatch(&event, true) {
                            return Some(self.allocation_failed(e));
                        }
                    }
                    pending |= self.tracks[i].tick(self.now);
                }
                if !self.rescan {
                    break;
                }
            }
        }

        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].render(&mut self.manager) {
                let voice = self.voices.remove(i);
                tracing::debug!(id = ?voice.id, now = self.now, "voice finished");
                self.manager.deallocate(voice.into_instrument());
                self.stats.voices_finished += 1;
            } else {
                i += 1;
            }
        }

        if let Err(e) = self.manager.tick() {
            tracing::warn!(now = self.now, "output failed: {}", e);
            return Some(EndReason::OutputFailed);
        }

        self.now += 1;
        if self.progress_interval > 0 {
            if let Some(progress) = self.progress.as_mut() {
                if self.now % self.progress_interval == 0 {
                    progress(self.now);
                }
            }
        }

        if matches!(mode, RunMode::SequenceOnce { .. }) && !pending && self.voices.is_empty() {
            return Some(EndReason::Completed);
        }
        None
    }

    fn allocation_failed(&self, e: InstrumentError) -> EndReason {
        tracing::warn!(now = self.now, "halting, {}", e);
        EndReason::AllocationFailed
    }

    fn find_voice(&self, id: CorrelationId) -> Option<usize> {
        self.voices.iter().position(|v| v.matches(id))
    }

    fn dispatch(&mut self, event: &Event, scheduled: bool) -> Result<(), InstrumentError> {
        tracing::trace!(now = self.now, kind = ?event.kind, id = event.id, "dispatch");
        self.stats.events += 1;
        if event.kind.targets_voice() {
            return self.dispatch_to_voice(event, scheduled);
        }
        match event.kind {
            EventKind::StartSound => self.start_voice(event, scheduled)?,
            EventKind::StartTrack { track } => self.start_track(track, event, scheduled),
            EventKind::StopTrack { track } => match self.track_index(track) {
                Some(i) => {
                    self.tracks[i].stop();
                    tracing::debug!(track, now = self.now, "track stopped");
                }
                None => self.stats.unknown_tracks += 1,
            },
            EventKind::ControlChange { control, value } => match self.controller.as_mut() {
                Some(controller) => controller.control_change(event.channel, control, value),
                None => self.stats.dropped_controls += 1,
            },
            EventKind::StopSound | EventKind::ChangeParams | EventKind::RestartSound => {}
        }
        Ok(())
    }

    /// Stop, change and restart act on the voice holding `event.id`. A restart with
    /// nothing to restart starts a new voice.
    fn dispatch_to_voice(&mut self, event: &Event, scheduled: bool) -> Result<(), InstrumentError> {
        let Some(i) = self.find_voice(event.id) else {
            if event.kind == EventKind::RestartSound {
                return self.start_voice(event, scheduled);
            }
            self.stats.unmatched += 1;
            return Ok(());
        };
        let voice = &mut self.voices[i];
        match event.kind {
            EventKind::StopSound => voice.release(),
            EventKind::ChangeParams => voice.instrument.param(event),
            EventKind::RestartSound => {
                voice.restart(event, scheduled);
                self.stats.voices_restarted += 1;
            }
            _ => {}
        }
        Ok(())
    }

    fn start_voice(&mut self, event: &Event, scheduled: bool) -> Result<(), InstrumentError> {
        let instrument = self.manager.allocate(event.instrument)?;
        if let Some(i) = self.find_voice(event.id) {
            self.voices[i].detach();
            self.stats.voices_detached += 1;
        }
        self.voices.push(ActiveVoice::start(event, instrument, scheduled));
        self.stats.voices_started += 1;
        tracing::debug!(
            id = event.id,
            instrument = %event.instrument,
            now = self.now,
            "voice started"
        );
        Ok(())
    }

    fn start_track(&mut self, track: u16, event: &Event, scheduled: bool) {
        if scheduled && track == event.track {
            tracing::warn!(track, "track cannot restart itself");
            self.stats.ignored_track_starts += 1;
            return;
        }
        if self.started_now.contains(&track) {
            tracing::warn!(track, now = self.now, "track already started this tick");
            self.stats.ignored_track_starts += 1;
            return;
        }
        match self.track_index(track) {
            Some(i) => {
                self.tracks[i].start(self.now, 0);
                self.started_now.push(track);
                self.rescan = true;
                tracing::debug!(track, now = self.now, "track started");
            }
            None => self.stats.unknown_tracks += 1,
        }
    }

    fn reclaim_voices(&mut self) {
        for voice in self.voices.drain(..) {
            self.manager.deallocate(voice.into_instrument());
            self.stats.voices_reclaimed += 1;
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.shared.queue.close();
    }
}

#[derive(Debug, Clone)]
pub enum SequencerUpdate {
    Progress { sample: u64 },
    Finished(RunReport),
}

/// A sequencer running on its own thread.
pub struct RenderThread {
    pub handle: SequencerHandle,
    pub updates: Receiver<SequencerUpdate>,
    join: JoinHandle<Sequencer>,
}

impl RenderThread {
    /// Waits for the run to end and hands the sequencer back.
    pub fn join(self) -> std::thread::Result<Sequencer> {
        self.join.join()
    }
}

/// Moves `sequencer` onto a dedicated render thread and starts `mode` there.
pub fn spawn_render_thread(mut sequencer: Sequencer, mode: RunMode) -> RenderThread {
    let (update_tx, update_rx): (Sender<SequencerUpdate>, _) = crossbeam::channel::unbounded();
    let handle = sequencer.handle();

    let progress_tx = update_tx.clone();
    sequencer.set_progress(move |sample| {
        let _ = progress_tx.send(SequencerUpdate::Progress { sample });
    });

    let join = std::thread::spawn(move || {
        let report = sequencer.run(mode);
        let _ = update_tx.send(SequencerUpdate::Finished(report));
        sequencer
    });

    RenderThread {
        handle,
        updates: update_rx,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BufferSink, Instrument, InstrumentDescriptor, InstrumentType};
    use crate::config::Settings;
    use crate::control::ChannelState;
    use crate::events::InstrumentId;

    fn sequencer() -> Sequencer {
        Sequencer::new(Settings::default().shared())
    }

    fn null_instrument(seq: &mut Sequencer, number: i32) -> InstrumentId {
        let kind = seq.manager().find_type("null").unwrap();
        seq.manager_mut().add_instrument(number, &kind, "n", "", None).number
    }

    #[test]
    fn empty_sequence_completes_after_one_tick() {
        let mut seq = sequencer();
        let report = seq.sequence_once(0, None);
        assert_eq!(report.reason, EndReason::Completed);
        assert_eq!(report.samples, 1);
    }

    #[test]
    fn end_time_bounds_a_run() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::start_sound(1, inst, 0, 1000));
        let report = seq.sequence_once(0, Some(10));
        assert_eq!(report.reason, EndReason::EndTime);
        assert_eq!(report.samples, 10);
        assert_eq!(report.stats.voices_reclaimed, 1);
        assert_eq!(seq.active_voices(), 0);
    }

    #[test]
    fn unknown_instrument_plays_silently() {
        let mut seq = sequencer();
        seq.add_event(Event::start_sound(1, InstrumentId(42), 0, 3));
        let report = seq.sequence_once(0, None);
        assert_eq!(report.reason, EndReason::Completed);
        assert_eq!(report.stats.unresolved_instruments, 1);
        assert_eq!(report.samples, 4);
    }

    #[test]
    fn allocation_failure_halts_the_run() {
        let mut seq = sequencer();
        let kind = seq.manager_mut().add_type(InstrumentType::new(
            "broken",
            Arc::new(|desc: &InstrumentDescriptor, _: &Settings| {
                Err::<Box<dyn Instrument>, _>(InstrumentError::Construction {
                    instrument: desc.number,
                    reason: "out of memory".into(),
                })
            }),
        ));
        let ok = null_instrument(&mut seq, 1);
        let broken = seq.manager_mut().add_instrument(2, &kind, "b", "", None).number;
        seq.add_event(Event::start_sound(1, ok, 0, 100));
        seq.add_event(Event::start_sound(2, broken, 5, 100));

        let report = seq.sequence_once(0, None);
        assert_eq!(report.reason, EndReason::AllocationFailed);
        assert_eq!(report.samples, 5);
        assert_eq!(report.stats.voices_reclaimed, 1);
    }

    #[test]
    fn start_on_busy_id_detaches_old_voice() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::start_sound(7, inst, 0, 50));
        seq.add_event(Event::start_sound(7, inst, 10, 50));
        seq.add_event(Event::stop_sound(7, 20));

        let report = seq.sequence_once(0, None);
        assert_eq!(report.stats.voices_started, 2);
        assert_eq!(report.stats.voices_detached, 1);
        assert_eq!(report.stats.unmatched, 0);
        assert_eq!(report.samples, 21);
    }

    #[test]
    fn control_changes_reach_controller() {
        let mut seq = sequencer();
        let state = ChannelState::new(4);
        seq.set_controller(Box::new(state.clone()));
        seq.add_event(Event::control_change(2, 7, 0.5, 3));
        seq.sequence_once(0, None);
        assert_eq!(state.value(2, 7), Some(0.5));
    }

    #[test]
    fn control_changes_without_controller_are_dropped() {
        let mut seq = sequencer();
        seq.add_event(Event::control_change(2, 7, 0.5, 0));
        let report = seq.sequence_once(0, None);
        assert_eq!(report.stats.dropped_controls, 1);
    }

    #[test]
    fn start_track_plays_relative_to_trigger() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::start_track(3, 10));
        seq.add_event(Event::start_sound(1, inst, 2, 0).on_track(3));

        let report = seq.sequence_once(0, None);
        // Voice starts at 12, stops on the same tick.
        assert_eq!(report.samples, 13);
        assert_eq!(report.stats.voices_started, 1);
    }

    #[test]
    fn started_track_from_later_track_plays_same_tick() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::start_track(5, 0));
        seq.add_event(Event::start_track(2, 0).on_track(5));
        seq.add_event(Event::start_sound(1, inst, 0, 0).on_track(2));

        let report = seq.sequence_once(0, None);
        assert_eq!(report.samples, 1);
        assert_eq!(report.stats.voices_started, 1);
    }

    #[test]
    fn self_restart_and_unknown_tracks_are_ignored() {
        let mut seq = sequencer();
        seq.add_event(Event::start_track(0, 0));
        seq.add_event(Event::start_track(9, 1));
        seq.add_event(Event::stop_track(8, 2));
        let report = seq.sequence_once(0, None);
        assert_eq!(report.stats.ignored_track_starts, 1);
        assert_eq!(report.stats.unknown_tracks, 2);
        assert_eq!(report.samples, 3);
    }

    #[test]
    fn stop_track_ends_its_events() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::start_track(1, 0));
        seq.add_event(Event::stop_track(1, 5));
        seq.add_event(Event::start_sound(1, inst, 3, 0).on_track(1));
        seq.add_event(Event::start_sound(2, inst, 10, 0).on_track(1));

        let report = seq.sequence_once(0, None);
        assert_eq!(report.stats.voices_started, 1);
        assert!(seq.track(1).unwrap().is_finished());
    }

    #[test]
    fn sequence_from_skips_earlier_events() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::start_sound(1, inst, 0, 0));
        seq.add_event(Event::start_sound(2, inst, 100, 0));
        let report = seq.sequence_once(50, None);
        assert_eq!(report.stats.voices_started, 1);
        assert_eq!(report.end, 101);
        assert_eq!(report.samples, 51);
    }

    #[test]
    fn progress_fires_every_interval() {
        let settings = Settings {
            progress_interval: 10,
            ..Settings::default()
        };
        let mut seq = Sequencer::new(settings.shared());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        seq.set_progress(move |sample| sink.lock().push(sample));
        seq.run(RunMode::Play { to: Some(35) });
        assert_eq!(*seen.lock(), vec![10, 20, 30]);
    }

    #[test]
    fn one_sample_per_tick_reaches_sink() {
        let mut seq = sequencer();
        let sink = BufferSink::new();
        seq.manager_mut().set_sink(Box::new(sink.clone()));
        seq.run(RunMode::Play { to: Some(64) });
        assert_eq!(sink.len(), 64);
    }

    #[test]
    fn halt_before_run_ends_it_immediately() {
        let mut seq = sequencer();
        seq.handle().halt();
        let report = seq.play();
        assert_eq!(report.reason, EndReason::Halted);
        assert_eq!(report.samples, 0);
        assert_eq!(seq.handle().state(), SequencerState::Off);

        let report = seq.sequence_once(0, None);
        assert_eq!(report.reason, EndReason::Completed);
    }

    #[test]
    fn halt_while_paused_does_not_pause_the_next_run() {
        let mut seq = sequencer();
        let handle = seq.handle();
        handle.pause();
        handle.halt();
        assert_eq!(seq.play().reason, EndReason::Halted);
        assert!(!handle.is_paused());

        let report = seq.run(RunMode::Play { to: Some(10) });
        assert_eq!(report.reason, EndReason::EndTime);
        assert_eq!(report.samples, 10);
    }

    #[test]
    fn voice_events_without_a_voice_only_count() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.add_event(Event::stop_sound(3, 0));
        seq.add_event(Event::change_params(3, 0));
        seq.add_event(Event::restart_sound(3, inst, 1, 0));
        let report = seq.sequence_once(0, None);
        assert_eq!(report.stats.unmatched, 2);
        assert_eq!(report.stats.voices_started, 1);
        assert_eq!(report.stats.voices_restarted, 0);
    }

    #[test]
    fn live_voices_ignore_duration() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        seq.push_immediate_event(Event::start_sound(1, inst, 0, 0));
        let report = seq.run(RunMode::Play { to: Some(20) });
        assert_eq!(report.reason, EndReason::EndTime);
        assert_eq!(report.stats.voices_finished, 0);
        assert_eq!(report.stats.voices_reclaimed, 1);
    }

    #[test]
    fn pushes_after_drop_are_ignored() {
        let seq = sequencer();
        let handle = seq.handle();
        drop(seq);
        handle.push_immediate_event(Event::stop_sound(1, 0));
        assert_eq!(handle.pending_immediate_events(), 0);
    }

    #[test]
    fn at_most_one_voice_per_id_on_every_tick() {
        let mut seq = sequencer();
        let inst = null_instrument(&mut seq, 1);
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        for start in 0..400 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let id = (seed >> 40) % 4;
            let event = match (seed >> 20) % 4 {
                0 => Event::start_sound(id, inst, start, (seed >> 50) % 7),
                1 => Event::restart_sound(id, inst, start, (seed >> 50) % 7),
                2 => Event::stop_sound(id, start),
                _ => Event::change_params(id, start),
            };
            seq.add_event(event);
        }

        let mode = RunMode::SequenceOnce { from: 0, to: None };
        seq.track_mut(0).start(0, 0);
        let mut ticks = 0;
        while seq.tick(mode).is_none() {
            for id in 0..4 {
                assert!(seq.voices().filter(|v| v.matches(id)).count() <= 1);
            }
            // Finished voices never survive the tick they finished on.
            assert!(seq.voices().all(|v| !v.instrument.is_finished()
                || v.state == crate::audio::VoiceState::Sounding));
            ticks += 1;
            assert!(ticks < 1000);
        }
    }

    #[test]
    fn render_thread_reports_progress_and_finish() {
        let settings = Settings {
            progress_interval: 100,
            ..Settings::default()
        };
        let mut seq = Sequencer::new(settings.shared());
        let inst = seq
            .manager_mut()
            .add_instrument_of_type(1, "null", "n", "", None)
            .unwrap()
            .number;
        seq.add_event(Event::start_sound(1, inst, 0, 250));

        let thread = spawn_render_thread(seq, RunMode::SequenceOnce { from: 0, to: None });
        let updates: Vec<SequencerUpdate> = thread.updates.iter().take(3).collect();
        let seq = thread.join().unwrap();

        assert!(matches!(updates[0], SequencerUpdate::Progress { sample: 100 }));
        assert!(matches!(updates[1], SequencerUpdate::Progress { sample: 200 }));
        match &updates[2] {
            SequencerUpdate::Finished(report) => {
                assert_eq!(report.reason, EndReason::Completed);
                assert_eq!(report.samples, 251);
            }
            other => panic!("unexpected update {:?}", other),
        }
        assert_eq!(seq.now(), 251);
    }
}
