//! Generated metronome input

use super::{BlockSource, BlockStatus, CaptureBackend};
use crate::audio::synthetic::SyntheticGenerator;
use crate::audio::{AudioConfig, CaptureError};
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep while waiting for the next block to be due
const MAX_SLEEP: Duration = Duration::from_millis(1);

/// Tone-burst backend for tests and demos
pub struct SyntheticBackend {
    paced: bool,
}

impl SyntheticBackend {
    /// Blocks are released in real time, one per block duration
    pub fn new() -> Self {
        Self { paced: true }
    }

    /// Blocks are released as fast as the capture loop asks for them
    pub fn unpaced() -> Self {
        Self { paced: false }
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&mut self, config: &AudioConfig) -> Result<Box<dyn BlockSource>, CaptureError> {
        Ok(Box::new(SyntheticSource {
            generator: SyntheticGenerator::new(&config.synthetic, config.sample_rate),
            block_duration: config.block_duration(),
            next_due: None,
            paced: self.paced,
        }))
    }
}

struct SyntheticSource {
    generator: SyntheticGenerator,
    block_duration: Duration,
    next_due: Option<Instant>,
    paced: bool,
}

impl BlockSource for SyntheticSource {
    fn next_block(&mut self, block: &mut [f32]) -> Result<BlockStatus, CaptureError> {
        if self.paced {
            let now = Instant::now();
            match self.next_due {
                Some(due) if now < due => {
                    thread::sleep((due - now).min(MAX_SLEEP));
                    return Ok(BlockStatus::Pending);
                }
                Some(due) => self.next_due = Some(due + self.block_duration),
                None => self.next_due = Some(now + self.block_duration),
            }
        }

        self.generator.fill(block);
        Ok(BlockStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::volume::block_rms;

    fn open(backend: &mut SyntheticBackend) -> Box<dyn BlockSource> {
        backend.open(&AudioConfig::default()).unwrap()
    }

    #[test]
    fn unpaced_source_is_always_ready() {
        let mut source = open(&mut SyntheticBackend::unpaced());
        let mut block = vec![0.0; 1024];

        for _ in 0..50 {
            assert_eq!(source.next_block(&mut block).unwrap(), BlockStatus::Ready);
        }
        assert!(block_rms(&block) > 0.0);
    }

    #[test]
    fn paced_source_releases_blocks_in_real_time() {
        let mut source = open(&mut SyntheticBackend::new());
        let mut block = vec![0.0; 1024];
        let start = Instant::now();

        let mut ready = 0;
        while ready < 5 {
            if source.next_block(&mut block).unwrap() == BlockStatus::Ready {
                ready += 1;
            }
        }

        // First block is immediate, the other four wait ~23 ms each
        let expected = AudioConfig::default().block_duration() * 4;
        assert!(start.elapsed() >= expected, "elapsed {:?}", start.elapsed());
    }

    #[test]
    fn paced_source_reports_pending_between_blocks() {
        let mut source = open(&mut SyntheticBackend::new());
        let mut block = vec![0.0; 1024];

        assert_eq!(source.next_block(&mut block).unwrap(), BlockStatus::Ready);
        assert_eq!(source.next_block(&mut block).unwrap(), BlockStatus::Pending);
    }
}
