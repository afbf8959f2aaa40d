//! Capture engine: lifecycle, processing requirements and the capture loop

use super::backend::{create_backend, BlockSource, BlockStatus, CaptureBackend};
use super::capture::{CancelSignal, CaptureError};
use super::exchange::SnapshotReader;
use super::processor::BlockProcessor;
use super::snapshot::AudioData;
use super::AudioConfig;
use parking_lot::Mutex;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Connecting = 1,
    Capturing = 2,
    Stopping = 3,

    /// Terminal; the engine can no longer capture
    Disposed = 4,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Capturing,
            3 => Self::Stopping,
            _ => Self::Disposed,
        }
    }
}

/// Which signals the capture loop computes for each block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requirements(u8);

impl Requirements {
    pub const NONE: Self = Self(0);
    pub const VOLUME: Self = Self(1);
    pub const MAGNITUDE: Self = Self(1 << 1);
    pub const DECIBELS: Self = Self(1 << 2);
    pub const WEB_AUDIO: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Unknown bits are dropped
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any signal needs the FFT
    pub const fn needs_frequency(self) -> bool {
        self.0 & (Self::MAGNITUDE.0 | Self::DECIBELS.0 | Self::WEB_AUDIO.0) != 0
    }
}

impl Default for Requirements {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for Requirements {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Requirements {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Counters accumulated over the engine's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Blocks processed and published
    pub blocks: u64,

    /// Blocks whose input was replaced with synthetic audio
    pub replaced_blocks: u64,

    /// Recoverable backend errors logged during capture
    pub transient_errors: u64,

    /// Snapshots allocated because readers held on to old ones
    pub fallback_allocations: u64,

    /// Times the OS delivered audio faster than it was consumed
    pub overruns: u64,
}

#[derive(Default)]
struct StatCounters {
    blocks: AtomicU64,
    replaced_blocks: AtomicU64,
    transient_errors: AtomicU64,
    fallback_allocations: AtomicU64,
    overruns: AtomicU64,
}

impl StatCounters {
    fn load(&self) -> CaptureStats {
        CaptureStats {
            blocks: self.blocks.load(Ordering::Relaxed),
            replaced_blocks: self.replaced_blocks.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
            fallback_allocations: self.fallback_allocations.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

/// Backend and pipeline, used by one capture session at a time
struct EngineCore {
    backend: Box<dyn CaptureBackend>,
    processor: BlockProcessor,
}

/// Audio capture engine.
///
/// One engine runs at most one capture session at a time. `start_capture`
/// blocks the calling thread until the session ends; everything else
/// (`snapshot`, requirement changes, `stats`, `state`) can be called from
/// any thread meanwhile. Wrap it in an `Arc` and use
/// [`CaptureHandle`](super::CaptureHandle) to capture on a background thread.
pub struct CaptureEngine {
    config: Arc<AudioConfig>,
    state: AtomicU8,
    requirements: AtomicU8,
    stats: StatCounters,
    reader: SnapshotReader,
    core: Mutex<EngineCore>,
}

impl CaptureEngine {
    /// Create an engine with the backend selected by `config.source`
    pub fn new(config: AudioConfig) -> Result<Self, CaptureError> {
        config.validate()?;
        let backend = create_backend(&config)?;
        Self::with_backend(config, backend)
    }

    /// Create an engine around a custom backend
    pub fn with_backend(
        config: AudioConfig,
        backend: Box<dyn CaptureBackend>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        let config = Arc::new(config);
        let processor = BlockProcessor::new(Arc::clone(&config));

        Ok(Self {
            reader: processor.reader(),
            core: Mutex::new(EngineCore { backend, processor }),
            state: AtomicU8::new(EngineState::Idle as u8),
            requirements: AtomicU8::new(Requirements::ALL.bits()),
            stats: StatCounters::default(),
            config,
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == EngineState::Capturing
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<AudioData> {
        self.reader.latest()
    }

    /// Cheap handle for reading snapshots from other threads
    pub fn reader(&self) -> SnapshotReader {
        self.reader.clone()
    }

    pub fn requirements(&self) -> Requirements {
        Requirements::from_bits_truncate(self.requirements.load(Ordering::Relaxed))
    }

    /// Replace the set of computed signals, effective from the next block
    pub fn set_requirements(&self, requirements: Requirements) {
        self.requirements.store(requirements.bits(), Ordering::Relaxed);
    }

    pub fn enable(&self, requirements: Requirements) {
        self.requirements.fetch_or(requirements.bits(), Ordering::Relaxed);
    }

    pub fn disable(&self, requirements: Requirements) {
        self.requirements.fetch_and(!requirements.bits(), Ordering::Relaxed);
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats.load()
    }

    /// Capture until `cancel` is signalled or the device fails.
    ///
    /// Calls `on_block` on this thread after each snapshot is published.
    /// When the session ends, for any reason after connecting, a final
    /// snapshot with no timestamp is published before this returns.
    pub fn start_capture<F>(
        &self,
        mut on_block: F,
        cancel: &CancelSignal,
    ) -> Result<(), CaptureError>
    where
        F: FnMut(&AudioData),
    {
        if let Err(current) = self.transition(EngineState::Idle, EngineState::Connecting) {
            let err = match current {
                EngineState::Disposed => CaptureError::Disposed,
                _ => CaptureError::AlreadyCapturing,
            };
            log::error!("start_capture() rejected: {}", err);
            return Err(err);
        }

        let mut core = self.core.lock();
        let EngineCore { backend, processor } = &mut *core;

        log::info!("Connecting to {} capture", backend.name());
        let source = match backend.open(&self.config) {
            Ok(source) => source,
            Err(e) => {
                log::error!("Failed to open {} capture: {}", backend.name(), e);
                self.set_state(EngineState::Idle);
                return Err(e);
            }
        };

        processor.reset();
        self.set_state(EngineState::Capturing);
        log::info!(
            "Audio capture started ({} Hz, {} samples per block)",
            self.config.sample_rate,
            self.config.block_size
        );

        let mut session = ActiveSession {
            engine: self,
            source: Some(source),
            processor,
        };
        let result = session.run(&mut on_block, cancel);
        drop(session);

        match &result {
            Ok(()) => log::info!("Audio capture stopped"),
            Err(e) => log::error!("Audio capture ended with error: {}", e),
        }
        result
    }

    /// Release the backend. Fails if a capture session is running.
    pub fn dispose(&self) -> Result<(), CaptureError> {
        loop {
            match self.state() {
                EngineState::Disposed => return Ok(()),
                EngineState::Idle => {
                    if self
                        .transition(EngineState::Idle, EngineState::Disposed)
                        .is_ok()
                    {
                        self.core.lock().backend.dispose();
                        log::info!("Capture engine disposed");
                        return Ok(());
                    }
                }
                _ => {
                    log::error!("dispose() called while capture is running");
                    return Err(CaptureError::DisposeWhileCapturing);
                }
            }
        }
    }

    fn transition(&self, from: EngineState, to: EngineState) -> Result<(), EngineState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(EngineState::from_u8)
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::warn!("Failed to dispose capture engine: {}", e);
        }
    }
}

/// One connected capture session.
///
/// Dropping it closes the source, publishes the stopped snapshot and returns
/// the engine to `Idle`, also when `on_block` panics.
struct ActiveSession<'a> {
    engine: &'a CaptureEngine,
    source: Option<Box<dyn BlockSource>>,
    processor: &'a mut BlockProcessor,
}

impl ActiveSession<'_> {
    fn run(
        &mut self,
        on_block: &mut dyn FnMut(&AudioData),
        cancel: &CancelSignal,
    ) -> Result<(), CaptureError> {
        let engine = self.engine;
        let processor = &mut *self.processor;
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };
        let overruns_before = engine.stats.overruns.load(Ordering::Relaxed);

        while !cancel.is_cancelled() {
            match source.next_block(processor.block_mut()) {
                Ok(BlockStatus::Ready) => {
                    let processed = processor.process(engine.requirements(), Instant::now());

                    engine.stats.blocks.fetch_add(1, Ordering::Relaxed);
                    if processed.replaced {
                        engine.stats.replaced_blocks.fetch_add(1, Ordering::Relaxed);
                    }
                    engine
                        .stats
                        .overruns
                        .store(overruns_before + source.overruns(), Ordering::Relaxed);
                    engine
                        .stats
                        .fallback_allocations
                        .store(processor.fallback_allocations(), Ordering::Relaxed);

                    on_block(&processed.snapshot);
                }
                Ok(BlockStatus::Pending) => thread::yield_now(),
                Err(e) if e.is_recoverable() => {
                    log::warn!("Capture error, continuing: {}", e);
                    engine.stats.transient_errors.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.engine.set_state(EngineState::Stopping);
        // Dropping the source closes the OS stream and waits out its callback
        drop(self.source.take());
        self.processor.finish();
        self.engine
            .stats
            .fallback_allocations
            .store(self.processor.fallback_allocations(), Ordering::Relaxed);
        self.engine.set_state(EngineState::Idle);
    }
}
