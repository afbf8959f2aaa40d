//! Audio capture and analysis module

pub mod backend;
mod capture;
mod config;
mod engine;
mod exchange;
pub mod fft;
mod processor;
pub mod resample;
mod snapshot;
mod sources;
pub mod synthetic;
pub mod volume;

pub use backend::{create_backend, BlockSource, BlockStatus, CaptureBackend};
pub use capture::{CancelSignal, CaptureError, CaptureHandle};
pub use config::{
    AudioConfig, CaptureSource, ConfigError, Normalization, SyntheticConfig, MAX_BLOCK_SIZE,
    MIN_BLOCK_SIZE,
};
pub use engine::{CaptureEngine, CaptureStats, EngineState, Requirements};
pub use exchange::SnapshotReader;
pub use fft::FrequencyAnalyzer;
pub use snapshot::AudioData;
pub use sources::{list_capture_devices, CaptureDevice, DeviceKind};
pub use synthetic::SyntheticGenerator;

/// Float samples in [-1, 1] are scaled by this to the signed 16-bit range
pub const SAMPLE_SCALE: f32 = i16::MAX as f32;
