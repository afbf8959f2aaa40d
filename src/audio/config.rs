//! Capture configuration
//!
//! An [`AudioConfig`] is built (or loaded from JSON) once, validated, and then
//! handed to a [`CaptureEngine`](super::CaptureEngine), which keeps it behind an
//! `Arc` for the lifetime of the engine. Nothing mutates it during capture.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Smallest accepted block size
pub const MIN_BLOCK_SIZE: usize = 512;

/// Largest accepted block size
pub const MAX_BLOCK_SIZE: usize = 16384;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Block size must be a power of two between 512 and 16384, got {0}")]
    InvalidBlockSize(usize),

    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which backend produces samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// System output mix (WASAPI loopback, or a monitor source elsewhere)
    #[default]
    Loopback,

    /// Line-in or microphone
    Device,

    /// Generated metronome tone, no hardware involved
    Synthetic,
}

/// Synthetic tone-burst parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Beats per minute
    pub bpm: f32,

    /// Length of each beat in seconds
    pub beat_duration_secs: f32,

    /// Tone frequency in Hz
    pub frequency_hz: f32,

    /// Beat amplitude as a fraction of full scale (0-1)
    pub amplitude: f32,

    /// Level between beats as a fraction of `amplitude` (0-1)
    pub minimum_level: f32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beat_duration_secs: 0.1,
            frequency_hz: 440.0,
            amplitude: 0.5,
            minimum_level: 0.1,
        }
    }
}

/// Divisors consumers apply to map each signal to roughly 0-1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    pub volume: f32,
    pub magnitude: f32,
    pub decibels: f32,
    pub web_audio: f32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            volume: 6000.0,
            magnitude: 6000.0,
            decibels: 100.0,
            web_audio: 100.0,
        }
    }
}

/// Audio capture and processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Backend selection
    pub source: CaptureSource,

    /// Explicit device name (None or empty = OS default)
    pub device_name: Option<String>,

    /// Requested sample rate in Hz
    pub sample_rate: u32,

    /// Samples per processed block (power of two)
    pub block_size: usize,

    /// Rows of history kept by consumers (e.g. a history texture)
    pub history_depth: usize,

    /// RMS window length in milliseconds
    pub rms_window_ms: u32,

    /// Run the silence state machine. It also runs whenever
    /// `replace_silence_after_secs` is set.
    pub detect_silence: bool,

    /// RMS at or below this value (16-bit sample scale) counts as silence
    pub silence_threshold: f32,

    /// Replace input with synthetic data after this many seconds of silence
    pub replace_silence_after_secs: Option<f32>,

    /// WebAudio analyser smoothing time constant (0 <= t < 1)
    pub web_audio_smoothing: f32,

    /// Lowest decibel value ever produced
    pub decibel_floor: f32,

    /// Bounded wait while connecting to a device
    pub connect_timeout_ms: u64,

    /// Stretch each OS buffer to one block instead of accumulating samples
    pub resample_os_buffers: bool,

    /// Synthetic generator parameters
    pub synthetic: SyntheticConfig,

    /// Normalization divisors
    pub normalization: Normalization,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::default(),
            device_name: None,
            sample_rate: 44100,
            block_size: 1024,
            history_depth: 128,
            rms_window_ms: 100,
            detect_silence: true,
            silence_threshold: 1.5,
            replace_silence_after_secs: None,
            web_audio_smoothing: 0.8,
            decibel_floor: -100.0,
            connect_timeout_ms: 3000,
            resample_os_buffers: false,
            synthetic: SyntheticConfig::default(),
            normalization: Normalization::default(),
        }
    }
}

impl AudioConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Check every field an engine depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
        {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", self.sample_rate));
        }
        if self.rms_window_ms == 0 {
            return Err(invalid("rms_window_ms", self.rms_window_ms));
        }
        if self.silence_threshold.is_nan() || self.silence_threshold < 0.0 {
            return Err(invalid("silence_threshold", self.silence_threshold));
        }
        if let Some(secs) = self.replace_silence_after_secs {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(invalid("replace_silence_after_secs", secs));
            }
        }
        if !(0.0..1.0).contains(&self.web_audio_smoothing) {
            return Err(invalid("web_audio_smoothing", self.web_audio_smoothing));
        }
        if !self.decibel_floor.is_finite() {
            return Err(invalid("decibel_floor", self.decibel_floor));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", self.connect_timeout_ms));
        }

        let synthetic = &self.synthetic;
        if !(synthetic.bpm > 0.0 && synthetic.bpm.is_finite()) {
            return Err(invalid("synthetic.bpm", synthetic.bpm));
        }
        if !(synthetic.beat_duration_secs >= 0.0 && synthetic.beat_duration_secs.is_finite()) {
            return Err(invalid(
                "synthetic.beat_duration_secs",
                synthetic.beat_duration_secs,
            ));
        }
        if !(synthetic.frequency_hz > 0.0 && synthetic.frequency_hz.is_finite()) {
            return Err(invalid("synthetic.frequency_hz", synthetic.frequency_hz));
        }
        if !(0.0..=1.0).contains(&synthetic.amplitude) {
            return Err(invalid("synthetic.amplitude", synthetic.amplitude));
        }
        if !(0.0..=1.0).contains(&synthetic.minimum_level) {
            return Err(invalid("synthetic.minimum_level", synthetic.minimum_level));
        }

        let n = &self.normalization;
        for (field, divisor) in [
            ("normalization.volume", n.volume),
            ("normalization.magnitude", n.magnitude),
            ("normalization.decibels", n.decibels),
            ("normalization.web_audio", n.web_audio),
        ] {
            if divisor == 0.0 || !divisor.is_finite() {
                return Err(invalid(field, divisor));
            }
        }

        Ok(())
    }

    /// Device name with empty strings treated as "use the default"
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref().filter(|name| !name.trim().is_empty())
    }

    /// Number of samples in the RMS window
    pub fn rms_window_len(&self) -> usize {
        let len = self.rms_window_ms as u64 * self.sample_rate as u64 / 1000;
        (len as usize).max(1)
    }

    /// FFT input length (two blocks, 50% overlap)
    pub fn fft_len(&self) -> usize {
        self.block_size * 2
    }

    /// Wall-clock duration of one block at the configured rate
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn replace_silence_after(&self) -> Option<Duration> {
        self.replace_silence_after_secs
            .map(|secs| Duration::from_secs_f32(secs.max(0.0)))
    }
}

fn invalid(field: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    }
}
