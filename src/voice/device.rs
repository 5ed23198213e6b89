//! Audio device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};

use crate::{Error, Result};

/// Snapshot of one audio device taken at startup
///
/// Hot-plugging is not tracked; a hardware change requires a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Position in the host's enumeration order
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
}

impl DeviceDescriptor {
    /// Whether the device can record
    #[must_use]
    pub const fn has_input(&self) -> bool {
        self.max_input_channels > 0
    }

    /// Whether the device can play
    #[must_use]
    pub const fn has_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

/// Enumerate every device on the default host
///
/// # Errors
///
/// Returns error if the host refuses to enumerate devices
pub fn list_devices() -> Result<Vec<DeviceDescriptor>> {
    let host = cpal::default_host();
    let devices = host
        .devices()
        .map_err(|e| Error::Audio(format!("failed to enumerate devices: {e}")))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| describe(index, &device))
        .collect())
}

/// Build a descriptor for a cpal device
pub(crate) fn describe(index: usize, device: &cpal::Device) -> DeviceDescriptor {
    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    DeviceDescriptor {
        index,
        name: device.name().unwrap_or_default(),
        max_input_channels,
        max_output_channels,
    }
}

/// Find the cpal device at an enumeration index
///
/// # Errors
///
/// Returns error if enumeration fails or the index no longer exists
pub(crate) fn device_at(index: usize) -> Result<cpal::Device> {
    let host = cpal::default_host();
    host.devices()
        .map_err(|e| Error::Audio(format!("failed to enumerate devices: {e}")))?
        .nth(index)
        .ok_or_else(|| Error::Audio(format!("device {index} disappeared")))
}

/// Log every device the way an operator needs to pick a substring
pub fn log_devices(devices: &[DeviceDescriptor]) {
    tracing::info!(count = devices.len(), "available audio devices");
    for dev in devices {
        tracing::info!(
            index = dev.index,
            name = %dev.name,
            inputs = dev.max_input_channels,
            outputs = dev.max_output_channels,
            "audio device"
        );
    }
}

/// Pick the capture device
///
/// The first device whose name contains `preferred` and has an input channel
/// wins; otherwise the first device with any input channel. An empty
/// `preferred` never matches. Returns the device and the usable channel
/// count, `min(wanted_channels, max_input_channels)`.
///
/// # Errors
///
/// Returns [`Error::NoInputDevice`] if no device has an input channel
pub fn select_input_device(
    devices: &[DeviceDescriptor],
    preferred: &str,
    wanted_channels: u16,
) -> Result<(DeviceDescriptor, u16)> {
    let preferred_match = (!preferred.is_empty())
        .then(|| {
            devices
                .iter()
                .find(|d| d.has_input() && d.name.contains(preferred))
        })
        .flatten();

    let chosen = if let Some(dev) = preferred_match {
        tracing::info!(
            index = dev.index,
            name = %dev.name,
            max_in = dev.max_input_channels,
            "using preferred input device"
        );
        dev
    } else {
        let dev = devices
            .iter()
            .find(|d| d.has_input())
            .ok_or(Error::NoInputDevice)?;
        tracing::info!(
            index = dev.index,
            name = %dev.name,
            max_in = dev.max_input_channels,
            preferred,
            "using fallback input device"
        );
        dev
    };

    let channels = wanted_channels.min(chosen.max_input_channels).max(1);
    Ok((chosen.clone(), channels))
}

/// Pick a playback device by name substring, if any matches
#[must_use]
pub fn select_output_device<'a>(
    devices: &'a [DeviceDescriptor],
    preferred: &str,
) -> Option<&'a DeviceDescriptor> {
    if preferred.is_empty() {
        return None;
    }
    devices
        .iter()
        .find(|d| d.has_output() && d.name.contains(preferred))
}
