//! Capture device enumeration and lookup

use super::CaptureError;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use serde::{Deserialize, Serialize};

/// Capture device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDevice {
    /// Name usable as `device_name` in the config
    pub name: String,

    /// Device type
    pub kind: DeviceKind,

    /// Whether this is the host's default device of its kind
    pub is_default: bool,
}

/// Type of capture device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Output device captured through loopback
    Output,

    /// Monitor source exposing the output mix as an input
    Monitor,

    /// Input device (line-in or microphone)
    Input,
}

/// List devices that can be captured from on the default host
pub fn list_capture_devices() -> Result<Vec<CaptureDevice>, CaptureError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    // Output devices only work as loopback sources on WASAPI
    if cfg!(target_os = "windows") {
        let default_output = host.default_output_device().and_then(|d| d.name().ok());
        let outputs = host
            .output_devices()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?;
        for device in outputs {
            if let Ok(name) = device.name() {
                devices.push(CaptureDevice {
                    is_default: default_output.as_deref() == Some(name.as_str()),
                    name,
                    kind: DeviceKind::Output,
                });
            }
        }
    }

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let inputs = host
        .input_devices()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;
    for device in inputs {
        if let Ok(name) = device.name() {
            let kind = if is_monitor_name(&name) {
                DeviceKind::Monitor
            } else {
                DeviceKind::Input
            };
            devices.push(CaptureDevice {
                is_default: default_input.as_deref() == Some(name.as_str()),
                name,
                kind,
            });
        }
    }

    Ok(devices)
}

/// PulseAudio/PipeWire expose the output mix as "Monitor of ..." inputs
pub(crate) fn is_monitor_name(name: &str) -> bool {
    name.to_lowercase().contains("monitor")
}

/// Input device whose name contains `name`
pub(crate) fn find_input_device(host: &Host, name: &str) -> Result<Option<Device>, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;
    Ok(find_by_name(devices, name))
}

/// Output device whose name contains `name`
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn find_output_device(host: &Host, name: &str) -> Result<Option<Device>, CaptureError> {
    let devices = host
        .output_devices()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;
    Ok(find_by_name(devices, name))
}

/// First input device that looks like a monitor of the output mix
#[cfg_attr(target_os = "windows", allow(dead_code))]
pub(crate) fn find_monitor_device(host: &Host) -> Result<Option<Device>, CaptureError> {
    let mut devices = host
        .input_devices()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;
    Ok(devices.find(|d| d.name().map(|n| is_monitor_name(&n)).unwrap_or(false)))
}

/// Exact name match wins over a substring match
fn find_by_name(devices: impl Iterator<Item = Device>, name: &str) -> Option<Device> {
    let mut partial = None;
    for device in devices {
        let Ok(device_name) = device.name() else {
            continue;
        };
        if device_name == name {
            return Some(device);
        }
        if partial.is_none() && device_name.contains(name) {
            partial = Some(device);
        }
    }
    partial
}
