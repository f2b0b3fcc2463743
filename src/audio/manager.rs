use std::collections::BTreeMap;
use std::sync::Arc;

use super::instrument::{
    Instrument, InstrumentDescriptor, InstrumentError, InstrumentType, MixOutput, NullInstrument,
    Template,
};
use super::sink::{NullSink, OutputSink, SinkError};
use crate::config::SharedSettings;
use crate::events::{CorrelationId, Event, InstrumentId};

/// Numbers handed out when a caller asks for a taken or negative number.
pub const FIRST_AUTO_NUMBER: i32 = 16384;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("unknown instrument type '{0}'")]
    UnknownType(String),
}

#[derive(Debug, Default)]
struct MixBus {
    channels: Vec<[f32; 2]>,
    fx: Vec<f32>,
}

impl MixBus {
    fn resize(&mut self, channels: usize, fx_units: usize) {
        self.channels.clear();
        self.channels.resize(channels, [0.0; 2]);
        self.fx.clear();
        self.fx.resize(fx_units, 0.0);
    }

    /// Sum of all inputs; accumulators are cleared for the next sample.
    fn take_frame(&mut self) -> (f32, f32) {
        let (mut left, mut right) = (0.0, 0.0);
        for slot in &mut self.channels {
            left += slot[0];
            right += slot[1];
            *slot = [0.0; 2];
        }
        // Effect units live outside the core; their sends come back dry.
        for send in &mut self.fx {
            left += *send;
            right += *send;
            *send = 0.0;
        }
        (left, right)
    }
}

/// Registry of instrument types and descriptors, and the only road from an
/// instrument instance to the output sink.
pub struct InstrumentManager {
    settings: SharedSettings,
    types: BTreeMap<String, Arc<InstrumentType>>,
    instruments: BTreeMap<InstrumentId, Arc<InstrumentDescriptor>>,
    next_number: i32,
    next_correlation: CorrelationId,
    mix: MixBus,
    sink: Box<dyn OutputSink>,
    unresolved: u64,
}

impl InstrumentManager {
    pub fn new(settings: SharedSettings) -> Self {
        let mut manager = Self {
            settings,
            types: BTreeMap::new(),
            instruments: BTreeMap::new(),
            next_number: FIRST_AUTO_NUMBER,
            next_correlation: 1,
            mix: MixBus::default(),
            sink: Box::new(NullSink),
            unresolved: 0,
        };
        manager.add_type(InstrumentType::null());
        manager.reset_mix();
        manager
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    /// Registers a type. A second registration under the same name returns the first.
    pub fn add_type(&mut self, kind: InstrumentType) -> Arc<InstrumentType> {
        self.types
            .entry(kind.name.clone())
            .or_insert_with(|| Arc::new(kind))
            .clone()
    }

    pub fn find_type(&self, name: &str) -> Option<Arc<InstrumentType>> {
        self.types.get(name).cloned()
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<InstrumentType>> {
        self.types.values()
    }

    /// Registers an instrument. Callers that need a particular number must check the
    /// returned descriptor: negative or taken numbers are replaced by a free one.
    pub fn add_instrument(
        &mut self,
        number: i32,
        kind: &Arc<InstrumentType>,
        name: &str,
        description: &str,
        template: Option<Template>,
    ) -> Arc<InstrumentDescriptor> {
        let number = if number < 0 || self.instruments.contains_key(&InstrumentId(number)) {
            self.next_free_number()
        } else {
            InstrumentId(number)
        };
        let template = template.or_else(|| kind.template_factory.as_ref().map(|f| f()));

        let desc = Arc::new(InstrumentDescriptor {
            number,
            name: name.to_string(),
            description: description.to_string(),
            kind: kind.clone(),
            template,
        });
        self.instruments.insert(number, desc.clone());
        tracing::debug!(%number, name, kind = %kind.name, "instrument registered");
        desc
    }

    pub fn add_instrument_of_type(
        &mut self,
        number: i32,
        type_name: &str,
        name: &str,
        description: &str,
        template: Option<Template>,
    ) -> Result<Arc<InstrumentDescriptor>, ManagerError> {
        let kind = self
            .find_type(type_name)
            .ok_or_else(|| ManagerError::UnknownType(type_name.to_string()))?;
        Ok(self.add_instrument(number, &kind, name, description, template))
    }

    fn next_free_number(&mut self) -> InstrumentId {
        while self.instruments.contains_key(&InstrumentId(self.next_number)) {
            self.next_number += 1;
        }
        let number = InstrumentId(self.next_number);
        self.next_number += 1;
        number
    }

    pub fn instrument(&self, number: InstrumentId) -> Option<&Arc<InstrumentDescriptor>> {
        self.instruments.get(&number)
    }

    pub fn instrument_by_name(&self, name: &str) -> Option<&Arc<InstrumentDescriptor>> {
        self.instruments.values().find(|d| d.name == name)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Arc<InstrumentDescriptor>> {
        self.instruments.values()
    }

    /// Drops every descriptor, running the type's template destructor on each template.
    pub fn clear(&mut self) {
        for desc in std::mem::take(&mut self.instruments).into_values() {
            if let (Some(destructor), Some(template)) =
                (desc.kind.template_destructor.as_ref(), desc.template.as_ref())
            {
                destructor(template);
            }
        }
        self.next_number = FIRST_AUTO_NUMBER;
    }

    /// A new instance for `number`. Unknown numbers get a silent `NullInstrument`;
    /// an error means the instance itself could not be built.
    pub fn allocate(
        &mut self,
        number: InstrumentId,
    ) -> Result<Box<dyn Instrument>, InstrumentError> {
        match self.instruments.get(&number).cloned() {
            Some(desc) => self.allocate_descriptor(&desc),
            None => {
                self.unresolved += 1;
                tracing::debug!(%number, "unresolved instrument, using null instrument");
                Ok(Box::new(NullInstrument::default()))
            }
        }
    }

    /// A new instance built by `desc`'s type from the current settings snapshot.
    pub fn allocate_descriptor(
        &self,
        desc: &InstrumentDescriptor,
    ) -> Result<Box<dyn Instrument>, InstrumentError> {
        let settings = self.settings.load();
        (desc.kind.instance_factory)(desc, &**settings).inspect_err(|e| {
            tracing::warn!(number = %desc.number, "allocation failed: {}", e);
        })
    }

    pub fn deallocate(&mut self, instance: Box<dyn Instrument>) {
        instance.destroy();
    }

    /// A new event stamped for `desc` with a fresh correlation id.
    pub fn manufacture_event(&mut self, desc: &InstrumentDescriptor) -> Event {
        let mut event = (desc.kind.event_factory)(desc);
        event.instrument = desc.number;
        event.id = self.next_correlation;
        self.next_correlation += 1;
        event
    }

    /// Number of allocations that fell back to the null instrument.
    pub fn unresolved_count(&self) -> u64 {
        self.unresolved
    }

    /// Swaps the output sink, returning the previous one.
    pub fn set_sink(&mut self, sink: Box<dyn OutputSink>) -> Box<dyn OutputSink> {
        std::mem::replace(&mut self.sink, sink)
    }

    fn reset_mix(&mut self) {
        let settings = self.settings.load();
        self.mix.resize(settings.mixer_channels, settings.fx_units);
    }

    pub fn start(&mut self) {
        self.reset_mix();
        self.sink.reset();
    }

    /// Pushes the mixed sample to the sink. Called once per tick after all voices ran.
    pub fn tick(&mut self) -> Result<(), SinkError> {
        let volume = self.settings.load().master_volume;
        let (left, right) = self.mix.take_frame();
        self.sink.write(left * volume, right * volume)
    }

    pub fn stop(&mut self) -> Result<(), SinkError> {
        self.sink.finish()
    }
}

impl MixOutput for InstrumentManager {
    fn output(&mut self, channel: u16, value: f32) {
        if let Some(slot) = self.mix.channels.get_mut(channel as usize) {
            slot[0] += value;
            slot[1] += value;
        }
    }

    fn output2(&mut self, channel: u16, left: f32, right: f32) {
        if let Some(slot) = self.mix.channels.get_mut(channel as usize) {
            slot[0] += left;
            slot[1] += right;
        }
    }

    fn fx_send(&mut self, unit: u16, value: f32) {
        if let Some(send) = self.mix.fx.get_mut(unit as usize) {
            *send += value;
        }
    }
}

impl Drop for InstrumentManager {
    fn drop(&mut self) {
        self.clear();
    }
}
