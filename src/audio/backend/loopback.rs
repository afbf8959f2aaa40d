//! System output capture

use super::stream::{open_stream, StreamSource};
use super::{BlockSource, CaptureBackend};
use crate::audio::{sources, AudioConfig, CaptureError};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedStreamConfig};

/// Captures whatever the system is playing.
///
/// An explicit device name that matches nothing is not an error: capture
/// falls back to the default device.
pub struct LoopbackBackend {
    device_name: Option<String>,
}

impl LoopbackBackend {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.device_name().map(str::to_string),
        }
    }
}

impl CaptureBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn open(&mut self, config: &AudioConfig) -> Result<Box<dyn BlockSource>, CaptureError> {
        let host = cpal::default_host();
        let (device, supported) = loopback_device(&host, self.device_name.as_deref(), config)?;
        log::info!(
            "Loopback capture from {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        // No connect wait: loopback delivers nothing while the output is idle
        let source: StreamSource = open_stream(&device, supported, config)?;
        Ok(Box::new(source))
    }
}

/// WASAPI loopback: capture from an OUTPUT device.
///
/// On Windows, cpal/WASAPI allows building an input stream on an output
/// device, queried with the output config it is producing.
#[cfg(target_os = "windows")]
fn loopback_device(
    host: &Host,
    device_name: Option<&str>,
    _config: &AudioConfig,
) -> Result<(Device, SupportedStreamConfig), CaptureError> {
    let named = match device_name {
        Some(name) => {
            let found = sources::find_output_device(host, name)?;
            if found.is_none() {
                log::debug!("Output device '{}' not found, using default", name);
            }
            found
        }
        None => None,
    };
    let device = match named {
        Some(device) => device,
        None => host.default_output_device().ok_or(CaptureError::NoDevice)?,
    };
    let supported = device
        .default_output_config()
        .map_err(|e| CaptureError::ConfigError(format!("Loopback config: {}", e)))?;
    Ok((device, supported))
}

/// Without WASAPI, the output mix is reachable through a monitor input
#[cfg(not(target_os = "windows"))]
fn loopback_device(
    host: &Host,
    device_name: Option<&str>,
    config: &AudioConfig,
) -> Result<(Device, SupportedStreamConfig), CaptureError> {
    let named = match device_name {
        Some(name) => {
            let found = sources::find_input_device(host, name)?;
            if found.is_none() {
                log::debug!("Capture device '{}' not found, using default", name);
            }
            found
        }
        None => None,
    };
    let device = match named {
        Some(device) => device,
        None => match sources::find_monitor_device(host)? {
            Some(monitor) => monitor,
            None => {
                log::info!("No monitor source found, using default input device");
                host.default_input_device().ok_or(CaptureError::NoDevice)?
            }
        },
    };
    let supported = super::stream::negotiate_input_config(&device, config)?;
    Ok((device, supported))
}
