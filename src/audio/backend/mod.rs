//! Capture backends
//!
//! A backend knows how to open one kind of input. Opening yields a
//! [`BlockSource`] that lives only on the capture thread for the length of a
//! session, which lets cpal's `!Send` streams stay where they were created.

mod device;
mod loopback;
mod stream;
mod synthetic;

pub use device::DeviceBackend;
pub use loopback::LoopbackBackend;
pub use synthetic::SyntheticBackend;

use super::{AudioConfig, CaptureError, CaptureSource};

/// Result of asking a source for the next block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// The block buffer holds a complete new block
    Ready,

    /// No complete block yet; poll again after checking for cancellation
    Pending,
}

/// Open capture session producing fixed-size mono blocks
pub trait BlockSource {
    /// Fill `block` with the next block of samples in the 16-bit range.
    ///
    /// Must return within a few milliseconds so the capture loop can poll
    /// its cancel signal.
    fn next_block(&mut self, block: &mut [f32]) -> Result<BlockStatus, CaptureError>;

    /// Samples dropped because the consumer fell behind
    fn overruns(&self) -> u64 {
        0
    }
}

/// Factory for capture sessions
pub trait CaptureBackend: Send {
    fn name(&self) -> &str;

    /// Connect to the input and start delivering blocks
    fn open(&mut self, config: &AudioConfig) -> Result<Box<dyn BlockSource>, CaptureError>;

    /// Release anything held between sessions
    fn dispose(&mut self) {}
}

/// Build the backend selected by `config.source`
pub fn create_backend(config: &AudioConfig) -> Result<Box<dyn CaptureBackend>, CaptureError> {
    let backend: Box<dyn CaptureBackend> = match config.source {
        CaptureSource::Loopback => Box::new(LoopbackBackend::new(config)),
        CaptureSource::Device => Box::new(DeviceBackend::new(config)?),
        CaptureSource::Synthetic => Box::new(SyntheticBackend::new()),
    };
    log::info!("Using {} capture backend", backend.name());
    Ok(backend)
}
