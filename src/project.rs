use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::{
    audio::{InstrumentType, Template, ToneTemplate, tone_type},
    config::{ConfigError, Settings, SharedSettings},
    events::Event,
    timing::Sequencer,
};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("failed to access project: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid project file: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to write project: {0}")]
    Serialize(#[from] ron::Error),
    #[error("instrument number {0} is used twice")]
    DuplicateInstrument(i32),
    #[error(transparent)]
    Settings(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Null,
    Tone(ToneTemplate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentData {
    pub number: i32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: InstrumentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub number: u16,
    #[serde(default)]
    pub loop_count: u32,
    /// `track` fields are overwritten with `number` on load.
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub instruments: Vec<InstrumentData>,
    #[serde(default)]
    pub tracks: Vec<TrackData>,
}

impl Project {
    pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let ron_string = fs::read_to_string(path)?;
        let project: Project = ron::from_str(&ron_string)?;
        if let Some(settings) = &project.settings {
            settings.validate()?;
        }
        tracing::info!(
            name = %project.name,
            instruments = project.instruments.len(),
            tracks = project.tracks.len(),
            "project loaded"
        );
        Ok(project)
    }

    /// The project's own settings, or the defaults.
    pub fn effective_settings(&self) -> Settings {
        self.settings.clone().unwrap_or_default()
    }

    /// A sequencer holding the project's instruments and tracks.
    pub fn build(&self, settings: SharedSettings) -> Result<Sequencer, ProjectError> {
        let mut sequencer = Sequencer::new(settings);
        self.load_into(&mut sequencer)?;
        Ok(sequencer)
    }

    /// Registers instruments and schedules events on an existing sequencer.
    pub fn load_into(&self, sequencer: &mut Sequencer) -> Result<(), ProjectError> {
        let manager = sequencer.manager_mut();
        let tone = manager.add_type(tone_type());
        let null = manager.add_type(InstrumentType::null());

        for inst in &self.instruments {
            let desc = match &inst.kind {
                InstrumentKind::Null => {
                    manager.add_instrument(inst.number, &null, &inst.name, &inst.description, None)
                }
                InstrumentKind::Tone(template) => manager.add_instrument(
                    inst.number,
                    &tone,
                    &inst.name,
                    &inst.description,
                    Some(Arc::new(template.clone()) as Template),
                ),
            };
            if desc.number.0 != inst.number {
                return Err(ProjectError::DuplicateInstrument(inst.number));
            }
        }

        for track in &self.tracks {
            sequencer.track_mut(track.number).set_loop_count(track.loop_count);
            for event in &track.events {
                sequencer.add_event(event.clone().on_track(track.number));
            }
        }
        Ok(())
    }
}
