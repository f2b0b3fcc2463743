use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::config::Settings;
use crate::events::{Event, InstrumentId};

/// Where an instrument sends its samples. Implemented by the instrument manager.
pub trait MixOutput {
    /// Mono contribution to a mixer input.
    fn output(&mut self, channel: u16, value: f32);
    fn output2(&mut self, channel: u16, left: f32, right: f32);
    fn fx_send(&mut self, unit: u16, value: f32);
}

/// A playing instance of a synthesis instrument.
///
/// The sequencer calls `start` once, `param` and `stop` as events arrive, and `tick`
/// exactly once per sample until the instance reports `is_finished` after a stop.
pub trait Instrument: Send {
    fn start(&mut self, event: &Event);
    fn param(&mut self, event: &Event);
    fn stop(&mut self);
    fn tick(&mut self, out: &mut dyn MixOutput);
    fn is_finished(&self) -> bool;

    /// Called on deallocation. Instances that recycle themselves override this.
    fn destroy(self: Box<Self>) {}
}

/// Silent stand-in for events naming an instrument nobody registered.
#[derive(Debug, Default)]
pub struct NullInstrument {
    stopped: bool,
}

impl Instrument for NullInstrument {
    fn start(&mut self, _event: &Event) {
        self.stopped = false;
    }

    fn param(&mut self, _event: &Event) {}

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn tick(&mut self, _out: &mut dyn MixOutput) {}

    fn is_finished(&self) -> bool {
        self.stopped
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("instrument {instrument} could not be constructed: {reason}")]
    Construction { instrument: InstrumentId, reason: String },
    #[error("template for instrument {0} has the wrong type")]
    TemplateMismatch(InstrumentId),
}

/// Opaque per-descriptor data new instances are initialised from.
pub type Template = Arc<dyn Any + Send + Sync>;

pub type InstanceFactory = Arc<
    dyn Fn(&InstrumentDescriptor, &Settings) -> Result<Box<dyn Instrument>, InstrumentError>
        + Send
        + Sync,
>;
pub type EventFactory = Arc<dyn Fn(&InstrumentDescriptor) -> Event + Send + Sync>;
pub type TemplateFactory = Arc<dyn Fn() -> Template + Send + Sync>;
pub type TemplateDestructor = Arc<dyn Fn(&Template) + Send + Sync>;

/// Capability set shared by every instrument of one synthesis family.
pub struct InstrumentType {
    pub name: String,
    pub instance_factory: InstanceFactory,
    pub event_factory: EventFactory,
    pub template_factory: Option<TemplateFactory>,
    pub template_destructor: Option<TemplateDestructor>,
}

impl InstrumentType {
    pub fn new(name: &str, instance_factory: InstanceFactory) -> Self {
        Self {
            name: name.to_string(),
            instance_factory,
            event_factory: Arc::new(|desc: &InstrumentDescriptor| Event {
                instrument: desc.number,
                ..Event::default()
            }),
            template_factory: None,
            template_destructor: None,
        }
    }

    pub fn with_event_factory(mut self, factory: EventFactory) -> Self {
        self.event_factory = factory;
        self
    }

    pub fn with_templates(
        mut self,
        factory: TemplateFactory,
        destructor: Option<TemplateDestructor>,
    ) -> Self {
        self.template_factory = Some(factory);
        self.template_destructor = destructor;
        self
    }

    /// The type backing `NullInstrument`.
    pub fn null() -> Self {
        Self::new(
            "null",
            Arc::new(|_: &InstrumentDescriptor, _: &Settings| {
                Ok(Box::new(NullInstrument::default()) as Box<dyn Instrument>)
            }),
        )
    }
}

impl fmt::Debug for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentType")
            .field("name", &self.name)
            .field("templates", &self.template_factory.is_some())
            .finish()
    }
}

/// A registered, numbered instrument configuration.
pub struct InstrumentDescriptor {
    pub number: InstrumentId,
    pub name: String,
    pub description: String,
    pub kind: Arc<InstrumentType>,
    pub template: Option<Template>,
}

impl InstrumentDescriptor {
    /// Typed view of the template, if one is set and has type `T`.
    pub fn template<T: Any>(&self) -> Option<&T> {
        self.template.as_ref().and_then(|t| t.downcast_ref::<T>())
    }
}

impl fmt::Debug for InstrumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentDescriptor")
            .field("number", &self.number)
            .field("name", &self.name)
            .field("kind", &self.kind.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_instrument_finishes_only_after_stop() {
        let mut inst = NullInstrument::default();
        inst.start(&Event::default());
        assert!(!inst.is_finished());
        inst.stop();
        assert!(inst.is_finished());
    }

    #[test]
    fn template_downcast() {
        let desc = InstrumentDescriptor {
            number: InstrumentId(1),
            name: "a".into(),
            description: String::new(),
            kind: Arc::new(InstrumentType::null()),
            template: Some(Arc::new(42u32)),
        };
        assert_eq!(desc.template::<u32>(), Some(&42));
        assert_eq!(desc.template::<f32>(), None);
    }

    #[test]
    fn default_event_factory_stamps_number() {
        let kind = InstrumentType::null();
        let desc = InstrumentDescriptor {
            number: InstrumentId(7),
            name: "b".into(),
            description: String::new(),
            kind: Arc::new(InstrumentType::null()),
            template: None,
        };
        let ev = (kind.event_factory)(&desc);
        assert_eq!(ev.instrument, InstrumentId(7));
    }
}
