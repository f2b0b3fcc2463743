use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const CONTROLLERS_PER_CHANNEL: usize = 128;

/// Receives control-change events. Purely observational: nothing flows back.
pub trait Controller: Send {
    fn control_change(&mut self, channel: u16, control: u16, value: f32);
}

/// Last value seen per channel and controller, readable from any thread.
#[derive(Debug, Clone)]
pub struct ChannelState {
    channels: usize,
    values: Arc<[AtomicU32]>,
}

impl ChannelState {
    pub fn new(channels: usize) -> Self {
        let values = (0..channels * CONTROLLERS_PER_CHANNEL)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect();
        Self { channels, values }
    }

    fn slot(&self, channel: u16, control: u16) -> Option<&AtomicU32> {
        let (channel, control) = (channel as usize, control as usize);
        if channel >= self.channels || control >= CONTROLLERS_PER_CHANNEL {
            return None;
        }
        self.values.get(channel * CONTROLLERS_PER_CHANNEL + control)
    }

    pub fn value(&self, channel: u16, control: u16) -> Option<f32> {
        self.slot(channel, control)
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
    }
}

impl Controller for ChannelState {
    fn control_change(&mut self, channel: u16, control: u16, value: f32) {
        if let Some(slot) = self.slot(channel, control) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }
}
