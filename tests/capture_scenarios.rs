//! Engine-level capture scenarios

use audioviz_capture::audio::backend::SyntheticBackend;
use audioviz_capture::{
    AudioConfig, BlockSource, BlockStatus, CancelSignal, CaptureBackend, CaptureEngine,
    CaptureError, CaptureHandle, CaptureSource, EngineState, Requirements,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn synthetic_config() -> AudioConfig {
    AudioConfig {
        source: CaptureSource::Synthetic,
        ..Default::default()
    }
}

fn wait_for_state(engine: &CaptureEngine, state: EngineState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.state() != state {
        assert!(Instant::now() < deadline, "engine never reached {state:?}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Fills every sample of block `n` with the value `n`
struct CountingBackend;

struct CountingSource {
    count: u32,
}

impl CaptureBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn open(&mut self, _config: &AudioConfig) -> Result<Box<dyn BlockSource>, CaptureError> {
        Ok(Box::new(CountingSource { count: 0 }))
    }
}

impl BlockSource for CountingSource {
    fn next_block(&mut self, block: &mut [f32]) -> Result<BlockStatus, CaptureError> {
        self.count += 1;
        block.fill(self.count as f32);
        Ok(BlockStatus::Ready)
    }
}

#[test]
fn synthetic_metronome_end_to_end() {
    let config = AudioConfig {
        silence_threshold: 3000.0,
        ..synthetic_config()
    };
    // Two seconds of audio
    let target_blocks = (2 * config.sample_rate as usize) / config.block_size;
    let engine =
        CaptureEngine::with_backend(config, Box::new(SyntheticBackend::unpaced())).unwrap();
    let cancel = CancelSignal::new();

    let mut max_volume = 0.0f32;
    let mut silent_intervals = 0;
    let mut was_silent = false;
    let mut blocks = 0;

    engine
        .start_capture(
            |data| {
                blocks += 1;
                max_volume = max_volume.max(data.volume());
                if data.is_silent() && !was_silent {
                    silent_intervals += 1;
                }
                was_silent = data.is_silent();

                assert_eq!(data.frequency_magnitude().len(), 1024);
                assert!(data.frequency_decibels().iter().all(|db| db.is_finite()));
                assert!(data.frequency_web_audio().iter().all(|db| *db >= -100.001));

                if blocks == target_blocks {
                    cancel.cancel();
                }
            },
            &cancel,
        )
        .unwrap();

    // 0.5 * 32767 / sqrt(2) when the RMS window sits on a beat
    assert!(
        (9000.0..12500.0).contains(&max_volume),
        "max volume {max_volume}"
    );
    assert!(silent_intervals >= 1, "no silent interval detected");
    assert_eq!(engine.stats().blocks, target_blocks as u64);
}

#[test]
fn concurrent_readers_never_see_torn_snapshots() {
    let engine = Arc::new(
        CaptureEngine::with_backend(AudioConfig::default(), Box::new(CountingBackend)).unwrap(),
    );
    engine.set_requirements(Requirements::VOLUME);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = engine.reader();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checked = 0u64;
                while !done.load(Ordering::Acquire) {
                    let snapshot = reader.latest();
                    if snapshot.is_stopped() || snapshot.sequence() == 0 {
                        continue;
                    }
                    let expected = snapshot.sequence() as f32;
                    assert!(
                        snapshot.wave().iter().all(|&s| s == expected),
                        "torn snapshot at sequence {}",
                        snapshot.sequence()
                    );
                    checked += 1;
                }
                checked
            })
        })
        .collect();

    let cancel = CancelSignal::new();
    let mut published = 0;
    engine
        .start_capture(
            |_| {
                published += 1;
                if published == 5000 {
                    cancel.cancel();
                }
            },
            &cancel,
        )
        .unwrap();
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.stats().blocks, 5000);
}

#[test]
fn misuse_is_reported_and_stop_publishes_sentinel() {
    let engine = Arc::new(CaptureEngine::new(synthetic_config()).unwrap());
    let mut capture = CaptureHandle::spawn(Arc::clone(&engine), |_| {}).unwrap();
    wait_for_state(&engine, EngineState::Capturing);

    let err = engine
        .start_capture(|_| {}, &CancelSignal::new())
        .unwrap_err();
    assert!(matches!(err, CaptureError::AlreadyCapturing));
    assert!(err.is_misuse());

    let err = engine.dispose().unwrap_err();
    assert!(matches!(err, CaptureError::DisposeWhileCapturing));

    // Let at least one real block through
    let reader = engine.reader();
    let deadline = Instant::now() + Duration::from_secs(5);
    while reader.sequence() == 0 {
        assert!(Instant::now() < deadline, "no block published");
        thread::sleep(Duration::from_millis(1));
    }

    capture.stop().unwrap();
    assert!(capture.is_finished());
    assert!(engine.snapshot().is_stopped());
    assert_eq!(engine.state(), EngineState::Idle);

    engine.dispose().unwrap();
    let err = engine
        .start_capture(|_| {}, &CancelSignal::new())
        .unwrap_err();
    assert!(matches!(err, CaptureError::Disposed));
}

#[test]
fn requirements_apply_from_the_next_block() {
    let engine =
        CaptureEngine::with_backend(synthetic_config(), Box::new(SyntheticBackend::unpaced()))
            .unwrap();
    let cancel = CancelSignal::new();
    let mut blocks = 0;

    engine
        .start_capture(
            |data| {
                blocks += 1;
                match blocks {
                    1 => {
                        assert!(data.frequency_magnitude().iter().any(|&m| m > 0.0));
                        engine.set_requirements(Requirements::VOLUME);
                    }
                    2 => {
                        assert!(data.frequency_magnitude().iter().all(|&m| m == 0.0));
                        cancel.cancel();
                    }
                    _ => {}
                }
            },
            &cancel,
        )
        .unwrap();
}

#[test]
fn config_file_drives_the_engine() {
    let path = std::env::temp_dir().join(format!("audioviz-capture-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{ "source": "synthetic", "block_size": 2048, "synthetic": { "bpm": 60.0 } }"#,
    )
    .unwrap();

    let config = AudioConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let engine = CaptureEngine::new(config).unwrap();
    assert_eq!(engine.config().block_size, 2048);
    assert_eq!(engine.snapshot().block_size(), 2048);
    assert!(engine.snapshot().is_stopped());
}
