//! Shared cpal plumbing for the loopback and line-in backends
//!
//! The OS callback downmixes each buffer to mono and assembles fixed-size
//! blocks in a small pool of preallocated buffers. Filled blocks travel to
//! the capture thread over one bounded channel and come back empty over
//! another, so the callback never allocates or blocks.

use super::{BlockSource, BlockStatus};
use crate::audio::resample::stretch_into;
use crate::audio::{AudioConfig, CaptureError, SAMPLE_SCALE};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Blocks in flight between the OS callback and the capture thread
const POOL_BLOCKS: usize = 8;

/// Frames downmixed per pass over an OS buffer
const MONO_SCRATCH_FRAMES: usize = 16384;

/// How long `next_block` waits before reporting `Pending`
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Callback-side half: turns interleaved OS buffers into mono blocks
pub(crate) struct BlockAssembler {
    block_size: usize,
    resample: bool,
    mono: Vec<f32>,
    current: Option<Vec<f32>>,
    filled: usize,
    free_rx: Receiver<Vec<f32>>,
    full_tx: Sender<Vec<f32>>,
    overruns: Arc<AtomicU64>,
}

/// Capture-thread half: hands out complete blocks and recycles them
pub(crate) struct BlockQueue {
    full_rx: Receiver<Vec<f32>>,
    free_tx: Sender<Vec<f32>>,
    overruns: Arc<AtomicU64>,
}

/// Create a connected assembler/queue pair with a preallocated pool
pub(crate) fn block_channel(block_size: usize, resample: bool) -> (BlockAssembler, BlockQueue) {
    let (free_tx, free_rx) = bounded(POOL_BLOCKS);
    let (full_tx, full_rx) = bounded(POOL_BLOCKS);
    for _ in 0..POOL_BLOCKS {
        let _ = free_tx.try_send(vec![0.0; block_size]);
    }
    let overruns = Arc::new(AtomicU64::new(0));

    let assembler = BlockAssembler {
        block_size,
        resample,
        mono: vec![0.0; MONO_SCRATCH_FRAMES.max(block_size)],
        current: None,
        filled: 0,
        free_rx,
        full_tx,
        overruns: Arc::clone(&overruns),
    };
    let queue = BlockQueue {
        full_rx,
        free_tx,
        overruns,
    };
    (assembler, queue)
}

impl BlockAssembler {
    /// Downmix one interleaved OS buffer and feed it into the pool
    pub(crate) fn push_interleaved<T>(&mut self, data: &[T], channels: usize)
    where
        T: cpal::Sample,
        f32: cpal::FromSample<T>,
    {
        let channels = channels.max(1);
        for chunk in data.chunks(self.mono.len() * channels) {
            let frames = chunk.len() / channels;
            for (out, frame) in self.mono.iter_mut().zip(chunk.chunks_exact(channels)) {
                let sum: f32 = frame
                    .iter()
                    .map(|&s| <f32 as cpal::Sample>::from_sample(s))
                    .sum();
                *out = sum / channels as f32 * SAMPLE_SCALE;
            }
            if self.resample {
                self.stretch_mono(frames);
            } else {
                self.accumulate_mono(frames);
            }
        }
    }

    /// Stretch the first `frames` mono samples into exactly one block
    fn stretch_mono(&mut self, frames: usize) {
        if frames == 0 {
            return;
        }
        let Some(mut block) = self.take_free_block() else {
            return;
        };
        stretch_into(&self.mono[..frames], &mut block);
        self.send_block(block);
    }

    /// Append the first `frames` mono samples to the block being filled
    fn accumulate_mono(&mut self, frames: usize) {
        let mut offset = 0;
        while offset < frames {
            if self.current.is_none() {
                let Some(block) = self.take_free_block() else {
                    return;
                };
                self.current = Some(block);
                self.filled = 0;
            }
            let Some(block) = self.current.as_mut() else {
                return;
            };

            let take = (frames - offset).min(self.block_size - self.filled);
            block[self.filled..self.filled + take]
                .copy_from_slice(&self.mono[offset..offset + take]);
            self.filled += take;
            offset += take;

            if self.filled == self.block_size {
                if let Some(block) = self.current.take() {
                    self.send_block(block);
                }
            }
        }
    }

    fn take_free_block(&mut self) -> Option<Vec<f32>> {
        match self.free_rx.try_recv() {
            Ok(block) => Some(block),
            Err(_) => {
                self.overruns.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn send_block(&mut self, block: Vec<f32>) {
        if let Err(e) = self.full_tx.try_send(block) {
            // Consumer gone or behind; keep the buffer for the next block
            self.overruns.fetch_add(1, Ordering::Relaxed);
            self.current = Some(e.into_inner());
            self.filled = 0;
        }
    }
}

impl BlockQueue {
    /// Wait up to `timeout` for a complete block
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<f32>>, CaptureError> {
        match self.full_rx.recv_timeout(timeout) {
            Ok(block) => Ok(Some(block)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Disconnected),
        }
    }

    /// Hand an emptied block back to the callback
    pub(crate) fn recycle(&self, block: Vec<f32>) {
        let _ = self.free_tx.try_send(block);
    }

    pub(crate) fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Running cpal input stream delivering blocks
pub(crate) struct StreamSource {
    // Dropped first so the OS callback stops before the queue goes away
    _stream: cpal::Stream,
    queue: BlockQueue,
    errors: Receiver<CaptureError>,
    pending: Option<Vec<f32>>,
}

impl StreamSource {
    /// Block until the device delivers its first block or `timeout` passes
    pub(crate) fn wait_for_first_block(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        if self.pending.is_some() {
            return Ok(());
        }
        self.check_errors()?;
        match self.queue.recv_timeout(timeout)? {
            Some(block) => {
                self.pending = Some(block);
                Ok(())
            }
            None => {
                self.check_errors()?;
                Err(CaptureError::ConnectTimeout(timeout.as_millis() as u64))
            }
        }
    }

    fn check_errors(&self) -> Result<(), CaptureError> {
        match self.errors.try_recv() {
            Ok(e) => Err(e),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(()),
        }
    }
}

impl BlockSource for StreamSource {
    fn next_block(&mut self, block: &mut [f32]) -> Result<BlockStatus, CaptureError> {
        if let Some(filled) = self.pending.take() {
            block.copy_from_slice(&filled);
            self.queue.recycle(filled);
            return Ok(BlockStatus::Ready);
        }

        self.check_errors()?;

        match self.queue.recv_timeout(POLL_INTERVAL)? {
            Some(filled) => {
                block.copy_from_slice(&filled);
                self.queue.recycle(filled);
                Ok(BlockStatus::Ready)
            }
            None => Ok(BlockStatus::Pending),
        }
    }

    fn overruns(&self) -> u64 {
        self.queue.overruns()
    }
}

/// Pick an input config at the requested rate, else the device default
pub(crate) fn negotiate_input_config(
    device: &Device,
    config: &AudioConfig,
) -> Result<SupportedStreamConfig, CaptureError> {
    let target_rate = SampleRate(config.sample_rate);
    let supported = device
        .supported_input_configs()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;

    for range in supported {
        log::debug!(
            "Supported config: channels={}, sample_rate={:?}-{:?}, format={:?}",
            range.channels(),
            range.min_sample_rate(),
            range.max_sample_rate(),
            range.sample_format()
        );
        if range.min_sample_rate() <= target_rate && target_rate <= range.max_sample_rate() {
            return Ok(range.with_sample_rate(target_rate));
        }
    }

    device
        .default_input_config()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))
}

/// Build and start an input stream on `device`
pub(crate) fn open_stream(
    device: &Device,
    supported: SupportedStreamConfig,
    config: &AudioConfig,
) -> Result<StreamSource, CaptureError> {
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();

    log::info!(
        "Audio capture: {} Hz, {} channels, {:?}",
        sample_rate,
        channels,
        sample_format
    );
    if sample_rate != config.sample_rate {
        log::warn!(
            "Device runs at {} Hz, analysis assumes {} Hz",
            sample_rate,
            config.sample_rate
        );
    }

    let (assembler, queue) = block_channel(config.block_size, config.resample_os_buffers);
    let (error_tx, error_rx) = bounded(16);
    let stream_config: StreamConfig = supported.into();

    let stream = match sample_format {
        SampleFormat::F32 => {
            build_stream::<f32>(device, &stream_config, assembler, channels, error_tx)
        }
        SampleFormat::I16 => {
            build_stream::<i16>(device, &stream_config, assembler, channels, error_tx)
        }
        SampleFormat::U16 => {
            build_stream::<u16>(device, &stream_config, assembler, channels, error_tx)
        }
        other => {
            return Err(CaptureError::ConfigError(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayError(e.to_string()))?;

    Ok(StreamSource {
        _stream: stream,
        queue,
        errors: error_rx,
        pending: None,
    })
}

/// Build audio stream for given sample type
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    mut assembler: BlockAssembler,
    channels: usize,
    errors: Sender<CaptureError>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            assembler.push_interleaved(data, channels);
        },
        move |err| {
            log::error!("Audio stream error: {}", err);
            let _ = errors.try_send(classify_stream_error(err));
        },
        None,
    )
}

/// Map an asynchronous stream error to how the capture loop treats it
fn classify_stream_error(err: cpal::StreamError) -> CaptureError {
    match err {
        cpal::StreamError::DeviceNotAvailable => CaptureError::Disconnected,
        cpal::StreamError::BackendSpecific { err } => CaptureError::Backend(err.description),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &BlockQueue) -> Vec<Vec<f32>> {
        let mut blocks = Vec::new();
        while let Ok(Some(block)) = queue.recv_timeout(Duration::ZERO) {
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn accumulates_odd_sized_buffers_into_blocks() {
        let (mut assembler, queue) = block_channel(512, false);
        let samples: Vec<f32> = (0..1500).map(|i| i as f32 / 32767.0).collect();

        for chunk in samples.chunks(441) {
            assembler.push_interleaved(chunk, 1);
        }

        let blocks = drain(&queue);
        assert_eq!(blocks.len(), 2);
        assert!((blocks[0][0] - 0.0).abs() < 1e-3);
        assert!((blocks[1][0] - 512.0).abs() < 1e-2);
        assert!((blocks[1][511] - 1023.0).abs() < 1e-2);
    }

    #[test]
    fn downmixes_and_scales_to_sixteen_bit() {
        let (mut assembler, queue) = block_channel(512, false);
        let stereo: Vec<f32> = std::iter::repeat([0.5f32, -0.25])
            .take(512)
            .flatten()
            .collect();

        assembler.push_interleaved(&stereo, 2);

        let blocks = drain(&queue);
        assert_eq!(blocks.len(), 1);
        let expected = 0.125 * SAMPLE_SCALE;
        assert!(blocks[0].iter().all(|&s| (s - expected).abs() < 1e-2));
    }

    #[test]
    fn converts_integer_samples() {
        let (mut assembler, queue) = block_channel(512, false);
        assembler.push_interleaved(&vec![i16::MIN; 512], 1);

        let blocks = drain(&queue);
        assert!(blocks[0].iter().all(|&s| (s + SAMPLE_SCALE).abs() < 2.0));
    }

    #[test]
    fn resample_mode_stretches_each_buffer_to_one_block() {
        let (mut assembler, queue) = block_channel(1024, true);
        let ramp: Vec<f32> = (0..1014).map(|i| i as f32 / 1013.0).collect();

        assembler.push_interleaved(&ramp, 1);
        assembler.push_interleaved(&ramp, 1);

        let blocks = drain(&queue);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 1024);
        assert!((blocks[0][0]).abs() < 1e-3);
        assert!((blocks[0][1023] - SAMPLE_SCALE).abs() < 1e-2);
    }

    #[test]
    fn full_pool_counts_overruns_instead_of_allocating() {
        let (mut assembler, queue) = block_channel(512, false);
        let block = vec![0.1f32; 512];

        for _ in 0..POOL_BLOCKS + 3 {
            assembler.push_interleaved(&block, 1);
        }

        assert!(queue.overruns() >= 3);
        let blocks = drain(&queue);
        assert_eq!(blocks.len(), POOL_BLOCKS);

        // Recycled buffers are filled again
        for block in blocks {
            queue.recycle(block);
        }
        assembler.push_interleaved(&vec![0.2f32; 512], 1);
        assert_eq!(drain(&queue).len(), 1);
    }

    #[test]
    fn device_loss_stops_capture() {
        assert!(matches!(
            classify_stream_error(cpal::StreamError::DeviceNotAvailable),
            CaptureError::Disconnected
        ));
        let err = classify_stream_error(cpal::StreamError::BackendSpecific {
            err: cpal::BackendSpecificError {
                description: "xrun".to_string(),
            },
        });
        assert!(err.is_recoverable());
    }
}
