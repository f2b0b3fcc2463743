use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::WavBits;

/// Receives one mixed stereo frame per tick.
pub trait OutputSink: Send {
    /// Called when a run starts.
    fn reset(&mut self) {}
    fn write(&mut self, left: f32, right: f32) -> Result<(), SinkError>;
    /// Called when a run ends, however it ended.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("output i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wav encoding error: {0}")]
    Wav(#[from] hound::Error),
    #[error("output already finalized")]
    Closed,
}

/// Discards everything. The manager starts with this until a real sink is attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&mut self, _left: f32, _right: f32) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps rendered frames in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    frames: Arc<Mutex<Vec<[f32; 2]>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<[f32; 2]> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peak(&self) -> f32 {
        self.frames
            .lock()
            .iter()
            .fold(0.0f32, |acc, [l, r]| acc.max(l.abs()).max(r.abs()))
    }
}

impl OutputSink for BufferSink {
    fn reset(&mut self) {
        self.frames.lock().clear();
    }

    fn write(&mut self, left: f32, right: f32) -> Result<(), SinkError> {
        self.frames.lock().push([left, right]);
        Ok(())
    }
}

/// Offline render to a stereo WAV file.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    bits: WavBits,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, bits: WavBits) -> Result<Self, SinkError> {
        let spec = match bits {
            WavBits::Int16 => hound::WavSpec {
                channels: 2,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            WavBits::Float32 => hound::WavSpec {
                channels: 2,
                sample_rate,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
        };
        let writer = hound::WavWriter::create(path, spec)?;
        Ok(Self {
            writer: Some(writer),
            bits,
        })
    }
}

impl OutputSink for WavSink {
    fn write(&mut self, left: f32, right: f32) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        match self.bits {
            WavBits::Int16 => {
                writer.write_sample(to_i16(left))?;
                writer.write_sample(to_i16(right))?;
            }
            WavBits::Float32 => {
                writer.write_sample(left)?;
                writer.write_sample(right)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Live output: frames go into a ring drained by the audio device callback.
///
/// A full ring paces the render thread. If the consumer stops draining for longer
/// than `wait`, the frame is dropped and counted as an overrun.
pub struct RingSink {
    producer: HeapProd<[f32; 2]>,
    wait: Duration,
    overruns: Arc<AtomicU64>,
}

impl RingSink {
    pub fn new(capacity: usize, wait: Duration) -> (Self, HeapCons<[f32; 2]>) {
        let (producer, consumer) = HeapRb::<[f32; 2]>::new(capacity).split();
        let sink = Self {
            producer,
            wait,
            overruns: Arc::new(AtomicU64::new(0)),
        };
        (sink, consumer)
    }

    pub fn overruns(&self) -> Arc<AtomicU64> {
        self.overruns.clone()
    }
}

impl OutputSink for RingSink {
    fn reset(&mut self) {
        self.overruns.store(0, Ordering::Relaxed);
    }

    fn write(&mut self, left: f32, right: f32) -> Result<(), SinkError> {
        let mut frame = [left, right];
        let deadline = Instant::now() + self.wait;
        loop {
            match self.producer.try_push(frame) {
                Ok(()) => return Ok(()),
                Err(rejected) => frame = rejected,
            }
            if Instant::now() >= deadline {
                if self.overruns.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!("output ring not drained, dropping frames");
                }
                return Ok(());
            }
            std::thread::sleep(Duration::from_micros(200));
        }
    }
}
