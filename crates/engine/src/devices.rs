//! Audio device enumeration for the track I/O pickers.

use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable identifier used in track input/output assignments. cpal keys
    /// devices by name, so the name doubles as the id.
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub fn list_input_devices() -> anyhow::Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let mut out = Vec::new();
    for device in host.input_devices()? {
        let Ok(name) = device.name() else { continue };
        out.push(DeviceInfo {
            id: name.clone(),
            is_default: Some(&name) == default_name.as_ref(),
            name,
        });
    }
    Ok(out)
}

pub fn list_output_devices() -> anyhow::Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mut out = Vec::new();
    for device in host.output_devices()? {
        let Ok(name) = device.name() else { continue };
        out.push(DeviceInfo {
            id: name.clone(),
            is_default: Some(&name) == default_name.as_ref(),
            name,
        });
    }
    Ok(out)
}
