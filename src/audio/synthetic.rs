//! Metronome-style tone bursts for tests and silence replacement

use super::config::SyntheticConfig;
use super::SAMPLE_SCALE;

/// Deterministic tone-burst generator.
///
/// Every sample is a pure function of a running sample index taken modulo
/// the beat period: a sine at `amplitude` for the first `beat_duration` of
/// each beat, then the same sine at `amplitude * minimum_level`.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    sample_index: u64,
    sample_rate: f32,
    beat_period: u64,
    beat_len: u64,
    frequency_hz: f32,
    beat_level: f32,
    floor_level: f32,
}

impl SyntheticGenerator {
    pub fn new(config: &SyntheticConfig, sample_rate: u32) -> Self {
        let rate = sample_rate as f64;
        let beat_period = ((rate * 60.0 / config.bpm as f64).round() as u64).max(1);
        let beat_len = ((rate * config.beat_duration_secs as f64).round() as u64).min(beat_period);
        let beat_level = config.amplitude * SAMPLE_SCALE;

        Self {
            sample_index: 0,
            sample_rate: sample_rate as f32,
            beat_period,
            beat_len,
            frequency_hz: config.frequency_hz,
            beat_level,
            floor_level: beat_level * config.minimum_level,
        }
    }

    /// Samples per beat
    pub fn beat_period(&self) -> u64 {
        self.beat_period
    }

    /// Samples per tone burst
    pub fn beat_len(&self) -> u64 {
        self.beat_len
    }

    /// Value of sample `index` in the signed 16-bit range
    pub fn sample_at(&self, index: u64) -> f32 {
        let pos = index % self.beat_period;
        let level = if pos < self.beat_len {
            self.beat_level
        } else {
            self.floor_level
        };
        let phase = 2.0 * std::f64::consts::PI * self.frequency_hz as f64 * pos as f64
            / self.sample_rate as f64;
        level * phase.sin() as f32
    }

    /// Fill `block` with the next samples and advance
    pub fn fill(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.sample_at(self.sample_index);
            self.sample_index = self.sample_index.wrapping_add(1);
        }
    }

    /// Rewind to the start of a beat
    pub fn reset(&mut self) {
        self.sample_index = 0;
    }
}
