//! AudioViz capture library
//!
//! Real-time audio capture for visualizers. A [`CaptureEngine`] pulls mono
//! blocks from the system output (loopback), a line-in device or a synthetic
//! metronome, derives RMS volume, FFT magnitude and decibel spectra, a
//! WebAudio-smoothed spectrum and silence state, and publishes each block as
//! an immutable [`AudioData`] snapshot that render threads read without
//! locking.
//!
//! ```no_run
//! use audioviz_capture::{AudioConfig, CaptureEngine, CaptureHandle};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), audioviz_capture::CaptureError> {
//! audioviz_capture::init_logging();
//!
//! let engine = Arc::new(CaptureEngine::new(AudioConfig::default())?);
//! let reader = engine.reader();
//! let mut capture = CaptureHandle::spawn(Arc::clone(&engine), |_| {})?;
//!
//! let latest = reader.latest();
//! println!("volume {}", latest.volume());
//!
//! capture.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod audio;

pub use audio::{
    list_capture_devices, AudioConfig, AudioData, BlockSource, BlockStatus, CancelSignal,
    CaptureBackend, CaptureDevice, CaptureEngine, CaptureError, CaptureHandle, CaptureSource,
    CaptureStats, ConfigError, DeviceKind, EngineState, Normalization, Requirements,
    SnapshotReader, SyntheticConfig,
};

/// Initialize `env_logger`, defaulting to the `info` level.
///
/// `RUST_LOG` overrides the default. Calling this more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
