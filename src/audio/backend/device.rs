//! Line-in and microphone capture

use super::stream::{negotiate_input_config, open_stream};
use super::{BlockSource, CaptureBackend};
use crate::audio::{sources, AudioConfig, CaptureError};
use cpal::traits::{DeviceTrait, HostTrait};

/// Captures from an input device.
///
/// Unlike loopback, a device name that matches nothing is rejected when the
/// backend is created.
pub struct DeviceBackend {
    device_name: Option<String>,
}

impl DeviceBackend {
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        let device_name = config.device_name().map(str::to_string);
        if let Some(name) = &device_name {
            let host = cpal::default_host();
            if sources::find_input_device(&host, name)?.is_none() {
                return Err(CaptureError::DeviceNotFound(name.clone()));
            }
        }
        Ok(Self { device_name })
    }
}

impl CaptureBackend for DeviceBackend {
    fn name(&self) -> &str {
        "device"
    }

    fn open(&mut self, config: &AudioConfig) -> Result<Box<dyn BlockSource>, CaptureError> {
        let host = cpal::default_host();
        let device = match &self.device_name {
            Some(name) => sources::find_input_device(&host, name)?
                .ok_or_else(|| CaptureError::DeviceNotFound(name.clone()))?,
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
        };
        log::info!(
            "Using audio input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let supported = negotiate_input_config(&device, config)?;
        let mut source = open_stream(&device, supported, config)?;

        let timeout = config.connect_timeout();
        source.wait_for_first_block(timeout)?;
        log::debug!("First block received from input device");

        Ok(Box::new(source))
    }
}
