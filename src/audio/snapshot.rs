//! Signal snapshot published once per block

use super::config::Normalization;
use std::time::{Duration, Instant};

/// One block's worth of derived signals.
///
/// Consumers only ever see published snapshots through an `Arc`, so every
/// field is read-only from the outside. The capture thread writes into its
/// private instance and swaps it in whole.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub(crate) wave: Vec<f32>,
    pub(crate) volume: f32,
    pub(crate) frequency_magnitude: Vec<f32>,
    pub(crate) frequency_decibels: Vec<f32>,
    pub(crate) frequency_web_audio: Vec<f32>,
    pub(crate) silence_started: Option<Instant>,
    pub(crate) timestamp: Option<Instant>,
    pub(crate) sequence: u64,
}

impl AudioData {
    /// Zeroed snapshot with no timestamp
    pub fn new(block_size: usize) -> Self {
        Self {
            wave: vec![0.0; block_size],
            volume: 0.0,
            frequency_magnitude: vec![0.0; block_size],
            frequency_decibels: vec![0.0; block_size],
            frequency_web_audio: vec![0.0; block_size],
            silence_started: None,
            timestamp: None,
            sequence: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.wave.len()
    }

    /// Raw mono samples in signed 16-bit range
    pub fn wave(&self) -> &[f32] {
        &self.wave
    }

    /// RMS volume over the configured window (16-bit scale)
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn frequency_magnitude(&self) -> &[f32] {
        &self.frequency_magnitude
    }

    pub fn frequency_decibels(&self) -> &[f32] {
        &self.frequency_decibels
    }

    /// WebAudio-style smoothed spectrum in decibels
    pub fn frequency_web_audio(&self) -> &[f32] {
        &self.frequency_web_audio
    }

    /// When the current silence began, if the input is silent
    pub fn silence_started(&self) -> Option<Instant> {
        self.silence_started
    }

    pub fn is_silent(&self) -> bool {
        self.silence_started.is_some()
    }

    /// How long the input has been silent as of `now` (zero if not silent)
    pub fn silence_duration(&self, now: Instant) -> Duration {
        self.silence_started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// When this block was produced; `None` means capture has stopped or
    /// no block has been produced yet
    pub fn timestamp(&self) -> Option<Instant> {
        self.timestamp
    }

    pub fn is_stopped(&self) -> bool {
        self.timestamp.is_none()
    }

    /// Publish counter within the capture session (0 before the first block)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn normalized_volume(&self, normalization: &Normalization) -> f32 {
        self.volume / normalization.volume
    }

    pub fn normalized_magnitude(&self, bin: usize, normalization: &Normalization) -> Option<f32> {
        self.frequency_magnitude
            .get(bin)
            .map(|m| m / normalization.magnitude)
    }

    pub fn normalized_decibels(&self, bin: usize, normalization: &Normalization) -> Option<f32> {
        self.frequency_decibels
            .get(bin)
            .map(|db| db / normalization.decibels)
    }

    pub fn normalized_web_audio(&self, bin: usize, normalization: &Normalization) -> Option<f32> {
        self.frequency_web_audio
            .get(bin)
            .map(|db| db / normalization.web_audio)
    }

    /// Copy every signal from `other` without reallocating.
    ///
    /// Both snapshots must have the same block size.
    pub(crate) fn copy_from(&mut self, other: &AudioData) {
        self.wave.copy_from_slice(&other.wave);
        self.volume = other.volume;
        self.frequency_magnitude.copy_from_slice(&other.frequency_magnitude);
        self.frequency_decibels.copy_from_slice(&other.frequency_decibels);
        self.frequency_web_audio.copy_from_slice(&other.frequency_web_audio);
        self.silence_started = other.silence_started;
        self.timestamp = other.timestamp;
        self.sequence = other.sequence;
    }
}
