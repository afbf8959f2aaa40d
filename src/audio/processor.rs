//! Per-block pipeline shared by every backend

use super::engine::Requirements;
use super::exchange::{SnapshotExchange, SnapshotReader};
use super::fft::FrequencyAnalyzer;
use super::snapshot::AudioData;
use super::synthetic::SyntheticGenerator;
use super::volume::{block_rms, RmsWindow, SilenceDetector, SilenceTransition};
use super::AudioConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Synthetic stand-in for input that has been silent too long
struct SilenceReplacement {
    after: Duration,
    generator: SyntheticGenerator,
    active: bool,
}

/// What one call to [`BlockProcessor::process`] published
pub(crate) struct ProcessedBlock {
    pub(crate) snapshot: Arc<AudioData>,
    pub(crate) replaced: bool,
}

/// Turns raw blocks into published snapshots.
///
/// Owned by the capture loop; nothing here is shared with readers except
/// through the exchange.
pub(crate) struct BlockProcessor {
    config: Arc<AudioConfig>,
    block: Vec<f32>,
    exchange: SnapshotExchange,
    analyzer: FrequencyAnalyzer,
    rms: RmsWindow,
    silence: SilenceDetector,
    replacement: Option<SilenceReplacement>,
    /// Detector runs when silence is reported or drives replacement
    track_silence: bool,
    sequence: u64,
}

impl BlockProcessor {
    pub(crate) fn new(config: Arc<AudioConfig>) -> Self {
        let replacement = config
            .replace_silence_after()
            .map(|after| SilenceReplacement {
                after,
                generator: SyntheticGenerator::new(&config.synthetic, config.sample_rate),
                active: false,
            });

        Self {
            block: vec![0.0; config.block_size],
            exchange: SnapshotExchange::new(config.block_size),
            analyzer: FrequencyAnalyzer::new(&config),
            rms: RmsWindow::new(config.rms_window_len()),
            silence: SilenceDetector::new(config.silence_threshold),
            track_silence: config.detect_silence || replacement.is_some(),
            replacement,
            sequence: 0,
            config,
        }
    }

    pub(crate) fn reader(&self) -> SnapshotReader {
        self.exchange.reader()
    }

    /// Buffer the backend writes the next raw block into
    pub(crate) fn block_mut(&mut self) -> &mut [f32] {
        &mut self.block
    }

    pub(crate) fn fallback_allocations(&self) -> u64 {
        self.exchange.fallback_allocations()
    }

    /// Run the raw block through volume, silence and frequency analysis and
    /// publish the result
    pub(crate) fn process(&mut self, requirements: Requirements, now: Instant) -> ProcessedBlock {
        let real_rms = self.replace_silent_block(now);

        let volume = if requirements.contains(Requirements::VOLUME) || self.track_silence {
            self.rms.push_block(&self.block)
        } else {
            0.0
        };

        if self.track_silence {
            // While replacing, silence follows the real input
            match self.silence.update(real_rms.unwrap_or(volume), now) {
                Some(SilenceTransition::Entered(_)) => {
                    log::debug!("Silence started (rms {:.2})", volume)
                }
                Some(SilenceTransition::Left(duration)) => {
                    log::debug!("Silence ended after {:.2}s", duration.as_secs_f32())
                }
                None => {}
            }
        }

        let internal = self.exchange.internal_mut();
        internal.wave.copy_from_slice(&self.block);
        internal.volume = if requirements.contains(Requirements::VOLUME) {
            volume
        } else {
            0.0
        };

        if requirements.needs_frequency() {
            self.analyzer.process(&self.block);
        } else {
            self.analyzer.shift_in(&self.block);
        }
        if requirements.contains(Requirements::MAGNITUDE) {
            self.analyzer.write_magnitude(&mut internal.frequency_magnitude);
        } else {
            internal.frequency_magnitude.fill(0.0);
        }
        if requirements.contains(Requirements::DECIBELS) {
            self.analyzer.write_decibels(&mut internal.frequency_decibels);
        } else {
            internal.frequency_decibels.fill(0.0);
        }
        if requirements.contains(Requirements::WEB_AUDIO) {
            self.analyzer.write_web_audio(&mut internal.frequency_web_audio);
        } else {
            internal.frequency_web_audio.fill(0.0);
        }

        self.sequence += 1;
        internal.sequence = self.sequence;
        internal.silence_started = self.silence.silence_started();
        internal.timestamp = Some(now);

        self.exchange.publish();

        ProcessedBlock {
            snapshot: self.exchange.current(),
            replaced: real_rms.is_some(),
        }
    }

    /// Publish the last signals again with no timestamp so readers can tell
    /// capture has stopped
    pub(crate) fn finish(&mut self) {
        {
            let current = self.exchange.current();
            let internal = self.exchange.internal_mut();
            internal.copy_from(&current);
        }
        self.sequence += 1;
        let internal = self.exchange.internal_mut();
        internal.sequence = self.sequence;
        internal.timestamp = None;
        internal.silence_started = None;
        self.exchange.publish();
    }

    /// Forget all signal history before a new session
    pub(crate) fn reset(&mut self) {
        self.block.fill(0.0);
        self.analyzer.reset();
        self.rms.reset();
        self.silence.reset();
        if let Some(replacement) = &mut self.replacement {
            replacement.active = false;
            replacement.generator.reset();
        }
        self.sequence = 0;
    }

    /// Swap the raw block for synthetic output once silence has lasted long
    /// enough. Returns the real block's RMS when it was replaced.
    fn replace_silent_block(&mut self, now: Instant) -> Option<f32> {
        let replacement = self.replacement.as_mut()?;

        if !replacement.active {
            if !self.silence.is_silent() || self.silence.silent_for(now) < replacement.after {
                return None;
            }
            replacement.active = true;
            replacement.generator.reset();
            log::info!(
                "Input silent for {:.1}s, replacing with synthetic audio",
                self.silence.silent_for(now).as_secs_f32()
            );
        }

        let real = block_rms(&self.block);
        if real > self.config.silence_threshold {
            replacement.active = false;
            log::info!("Input resumed, silence replacement ended");
            return None;
        }

        replacement.generator.fill(&mut self.block);
        Some(real)
    }
}
