//! Frequency analysis over a 50%-overlapped sliding window

use super::AudioConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Blackman coefficients (WebAudio analyser form)
const BLACKMAN_A0: f32 = 0.42;
const BLACKMAN_A1: f32 = 0.5;
const BLACKMAN_A2: f32 = 0.08;

/// Build a Blackman window of `len` points
pub fn blackman_window(len: usize) -> Vec<f32> {
    let n = len as f32;
    (0..len)
        .map(|i| {
            let x = i as f32 / n;
            BLACKMAN_A0 - BLACKMAN_A1 * (2.0 * std::f32::consts::PI * x).cos()
                + BLACKMAN_A2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

/// Convert a magnitude to decibels, clamping at `floor_magnitude`
#[inline]
pub fn magnitude_to_decibels(magnitude: f32, floor_magnitude: f32) -> f32 {
    20.0 * magnitude.max(floor_magnitude).log10()
}

/// One WebAudio smoothing step: `state = t * state + (1 - t) * current`
pub fn smooth_magnitudes(state: &mut [f32], current: &[f32], smoothing: f32) {
    for (s, &m) in state.iter_mut().zip(current) {
        let blended = smoothing * *s + (1.0 - smoothing) * m;
        *s = if blended.is_finite() { blended } else { 0.0 };
    }
}

/// FFT analyzer for a continuous stream of fixed-size blocks.
///
/// Every buffer is allocated up front; [`process`](Self::process) and the
/// output methods never allocate.
pub struct FrequencyAnalyzer {
    block_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,

    /// Previous block followed by the newest block
    sliding: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitude: Vec<f32>,

    /// Persistent WebAudio smoothing state, one value per bin
    smoothed: Vec<f32>,
    smoothing: f32,
    floor_magnitude: f32,
}

impl FrequencyAnalyzer {
    /// Create new analyzer sized from the config
    pub fn new(config: &AudioConfig) -> Self {
        let block_size = config.block_size;
        let window_len = config.fft_len();
        let fft_len = window_len.next_power_of_two();

        let fft = FftPlanner::new().plan_fft_forward(fft_len);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            block_size,
            fft,
            window: blackman_window(window_len),
            sliding: vec![0.0; window_len],
            spectrum: vec![Complex::new(0.0, 0.0); fft_len],
            scratch,
            magnitude: vec![0.0; block_size],
            smoothed: vec![0.0; block_size],
            smoothing: config.web_audio_smoothing,
            floor_magnitude: 10f32.powf(config.decibel_floor / 20.0),
        }
    }

    /// Number of output bins (equals the block size)
    pub fn bins(&self) -> usize {
        self.block_size
    }

    /// Shift `block` into the sliding window and compute the magnitude spectrum
    pub fn process(&mut self, block: &[f32]) {
        self.shift_in(block);

        let window_len = self.sliding.len();
        for ((bin, &sample), &w) in self
            .spectrum
            .iter_mut()
            .zip(&self.sliding)
            .zip(&self.window)
        {
            *bin = Complex::new(sample * w, 0.0);
        }
        for bin in &mut self.spectrum[window_len..] {
            *bin = Complex::new(0.0, 0.0);
        }

        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / self.spectrum.len() as f32;
        for (m, c) in self.magnitude.iter_mut().zip(&self.spectrum) {
            *m = c.norm() * scale;
        }
    }

    /// Shift `block` into the sliding window without transforming it
    pub fn shift_in(&mut self, block: &[f32]) {
        debug_assert_eq!(block.len(), self.block_size);

        self.sliding.copy_within(self.block_size.., 0);
        self.sliding[self.block_size..].copy_from_slice(block);
    }

    /// Magnitude spectrum of the last processed block
    pub fn magnitude(&self) -> &[f32] {
        &self.magnitude
    }

    pub fn write_magnitude(&self, out: &mut [f32]) {
        out.copy_from_slice(&self.magnitude);
    }

    /// Decibels of the last magnitude spectrum
    pub fn write_decibels(&self, out: &mut [f32]) {
        for (db, &m) in out.iter_mut().zip(&self.magnitude) {
            *db = magnitude_to_decibels(m, self.floor_magnitude);
        }
    }

    /// Advance the smoothing state with the last magnitude spectrum and write
    /// its decibels.
    ///
    /// Smoothing happens on magnitudes, before the log.
    pub fn write_web_audio(&mut self, out: &mut [f32]) {
        smooth_magnitudes(&mut self.smoothed, &self.magnitude, self.smoothing);
        for (db, &s) in out.iter_mut().zip(&self.smoothed) {
            *db = magnitude_to_decibels(s, self.floor_magnitude);
        }
    }

    /// Clear the sliding window and smoothing state
    pub fn reset(&mut self) {
        self.sliding.fill(0.0);
        self.magnitude.fill(0.0);
        self.smoothed.fill(0.0);
    }
}
