//! Sliding-window RMS volume and silence detection

use std::time::{Duration, Instant};

/// Fixed-length RMS window with a running sum.
///
/// Each sample costs O(1): the evicted square is subtracted, the new one
/// added. The sum is recomputed from scratch once per wrap of the write
/// pointer so rounding error cannot build up over long sessions.
pub struct RmsWindow {
    squares: Vec<f64>,
    pos: usize,
    sum: f64,
}

impl RmsWindow {
    pub fn new(len: usize) -> Self {
        Self {
            squares: vec![0.0; len.max(1)],
            pos: 0,
            sum: 0.0,
        }
    }

    /// Window length in samples
    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    /// Add one sample and return the updated RMS
    #[inline]
    pub fn push(&mut self, sample: f32) -> f32 {
        let square = sample as f64 * sample as f64;
        self.sum += square - self.squares[self.pos];
        self.squares[self.pos] = square;
        self.pos += 1;
        if self.pos == self.squares.len() {
            self.pos = 0;
            self.sum = self.squares.iter().sum();
        }
        self.rms()
    }

    /// Add a block of samples and return the RMS after the last one
    pub fn push_block(&mut self, samples: &[f32]) -> f32 {
        for &sample in samples {
            self.push(sample);
        }
        self.rms()
    }

    pub fn rms(&self) -> f32 {
        (self.sum.max(0.0) / self.squares.len() as f64).sqrt() as f32
    }

    pub fn reset(&mut self) {
        self.squares.fill(0.0);
        self.pos = 0;
        self.sum = 0.0;
    }
}

/// RMS of a single block, used to check real input while it is being replaced
pub fn block_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (energy / samples.len() as f64).sqrt() as f32
}

/// Silence state change reported by [`SilenceDetector::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceTransition {
    /// Volume dropped to or below the threshold at this instant
    Entered(Instant),

    /// Volume rose above the threshold after being silent this long
    Left(Duration),
}

/// Silent / not-silent state machine driven once per block
pub struct SilenceDetector {
    threshold: f32,
    silent_since: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            silent_since: None,
        }
    }

    /// Feed the latest RMS value observed at `now`
    pub fn update(&mut self, rms: f32, now: Instant) -> Option<SilenceTransition> {
        match self.silent_since {
            None if rms <= self.threshold => {
                self.silent_since = Some(now);
                Some(SilenceTransition::Entered(now))
            }
            Some(since) if rms > self.threshold => {
                self.silent_since = None;
                Some(SilenceTransition::Left(now.saturating_duration_since(since)))
            }
            _ => None,
        }
    }

    /// When the current silence began
    pub fn silence_started(&self) -> Option<Instant> {
        self.silent_since
    }

    pub fn is_silent(&self) -> bool {
        self.silent_since.is_some()
    }

    /// How long the input has been silent as of `now`
    pub fn silent_for(&self, now: Instant) -> Duration {
        self.silent_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.silent_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn direct_rms(history: &[f32], window: usize) -> f32 {
        let start = history.len().saturating_sub(window);
        let sum: f64 = history[start..].iter().map(|&s| s as f64 * s as f64).sum();
        (sum / window as f64).sqrt() as f32
    }

    #[test]
    fn constant_signal_reaches_its_amplitude() {
        let mut window = RmsWindow::new(100);
        for _ in 0..99 {
            window.push(3.0);
        }
        assert!(window.rms() < 3.0);

        assert!((window.push(3.0) - 3.0).abs() < 1e-6);
        assert!((window.push_block(&[3.0; 250]) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn old_samples_are_evicted() {
        let mut window = RmsWindow::new(4);
        window.push_block(&[100.0, 100.0, 100.0, 100.0]);
        let rms = window.push_block(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(rms, 0.0);
    }

    #[test]
    fn zero_length_window_is_clamped_to_one() {
        let mut window = RmsWindow::new(0);
        assert_eq!(window.len(), 1);
        assert_eq!(window.push(-4.0), 4.0);
    }

    #[test]
    fn block_rms_of_sine_matches_amplitude_over_root_two() {
        let samples: Vec<f32> = (0..4410)
            .map(|i| 1000.0 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let rms = block_rms(&samples);
        assert!((rms - 1000.0 / 2f32.sqrt()).abs() < 1.0, "got {rms}");
        assert_eq!(block_rms(&[]), 0.0);
    }

    proptest! {
        #[test]
        fn running_sum_matches_direct_window(
            samples in prop::collection::vec(-32768.0f32..32767.0, 1..1500),
            window in 1usize..300,
        ) {
            let mut rms_window = RmsWindow::new(window);
            for (i, &sample) in samples.iter().enumerate() {
                let running = rms_window.push(sample);
                let direct = direct_rms(&samples[..=i], window);
                let tolerance = 1e-3 * direct.max(10.0);
                prop_assert!(
                    (running - direct).abs() <= tolerance,
                    "sample {}: running {} vs direct {}", i, running, direct
                );
            }
        }
    }

    #[test]
    fn single_silent_interval_matches_crossings() {
        let block = 1024;
        let block_time = Duration::from_secs_f64(block as f64 / 44100.0);
        let start = Instant::now();
        let mut window = RmsWindow::new(block);
        let mut detector = SilenceDetector::new(10.0);

        // 5 loud blocks, 10 silent blocks, 5 loud blocks
        let loud = vec![500.0f32; block];
        let quiet = vec![0.0f32; block];
        let schedule: Vec<&[f32]> = std::iter::repeat(loud.as_slice())
            .take(5)
            .chain(std::iter::repeat(quiet.as_slice()).take(10))
            .chain(std::iter::repeat(loud.as_slice()).take(5))
            .collect();

        let mut entered = Vec::new();
        let mut left = Vec::new();
        for (index, samples) in schedule.iter().enumerate() {
            let now = start + block_time * index as u32;
            let rms = window.push_block(samples);
            match detector.update(rms, now) {
                Some(SilenceTransition::Entered(_)) => entered.push(index),
                Some(SilenceTransition::Left(duration)) => left.push((index, duration)),
                None => {}
            }
        }

        assert_eq!(entered.len(), 1);
        assert_eq!(left.len(), 1);
        assert!(entered[0].abs_diff(5) <= 1, "entered at block {}", entered[0]);
        assert!(left[0].0.abs_diff(15) <= 1, "left at block {}", left[0].0);
        assert_eq!(left[0].1, block_time * (left[0].0 - entered[0]) as u32);
        assert!(!detector.is_silent());
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut detector = SilenceDetector::new(1.5);
        let now = Instant::now();
        assert_eq!(
            detector.update(1.5, now),
            Some(SilenceTransition::Entered(now))
        );
        assert!(detector.is_silent());
        assert_eq!(detector.update(1.0, now), None);
        assert_eq!(detector.silence_started(), Some(now));
    }

    #[test]
    fn silent_for_grows_while_silent() {
        let mut detector = SilenceDetector::new(1.0);
        let start = Instant::now();
        detector.update(0.0, start);

        assert_eq!(
            detector.silent_for(start + Duration::from_secs(3)),
            Duration::from_secs(3)
        );

        detector.reset();
        assert_eq!(detector.silent_for(start + Duration::from_secs(3)), Duration::ZERO);
    }
}
