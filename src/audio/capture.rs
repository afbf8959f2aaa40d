//! Capture errors and a dedicated capture thread

use super::config::ConfigError;
use super::engine::CaptureEngine;
use super::snapshot::AudioData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No capture device available")]
    NoDevice,

    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Timed out after {0} ms waiting for the device to deliver audio")]
    ConnectTimeout(u64),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture device disconnected")]
    Disconnected,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Capture is already running")]
    AlreadyCapturing,

    #[error("Cannot dispose while capture is running")]
    DisposeWhileCapturing,

    #[error("Capture engine has been disposed")]
    Disposed,

    #[error("Thread error: {0}")]
    ThreadError(String),
}

impl CaptureError {
    /// Errors the capture loop logs and survives
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Errors caused by calling the engine in the wrong state
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyCapturing | Self::DisposeWhileCapturing | Self::Disposed
        )
    }
}

/// Cooperative stop flag polled once per capture loop iteration
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Capture session running on its own thread.
///
/// The engine's blocking [`start_capture`](CaptureEngine::start_capture) runs
/// on a thread named `audio-capture`. Stopping cancels the session and joins
/// the thread; dropping the handle does the same.
pub struct CaptureHandle {
    cancel: CancelSignal,
    engine: Arc<CaptureEngine>,
    thread_handle: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl CaptureHandle {
    /// Start capturing on a new thread, calling `on_block` after every publish
    pub fn spawn<F>(engine: Arc<CaptureEngine>, on_block: F) -> Result<Self, CaptureError>
    where
        F: FnMut(&AudioData) + Send + 'static,
    {
        let cancel = CancelSignal::new();
        let thread_cancel = cancel.clone();
        let thread_engine = Arc::clone(&engine);

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let result = thread_engine.start_capture(on_block, &thread_cancel);
                if let Err(e) = &result {
                    log::error!("Audio thread error: {}", e);
                }
                result
            })
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        Ok(Self {
            cancel,
            engine,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn engine(&self) -> &Arc<CaptureEngine> {
        &self.engine
    }

    /// Whether the capture thread has exited on its own
    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Stop the capture and return how the session ended
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.cancel.cancel();
        match self.thread_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CaptureError::ThreadError("audio thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
