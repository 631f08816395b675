//! Device enumeration primitives
//!
//! Out of scope for the engine (spec.md §1): "device enumeration
//! primitives on the host OS (listing input/output device IDs, resolving
//! unique IDs and human labels, default-device change notifications)".
//! This module provides that enumeration, grounded in
//! `gecko_core::device::AudioDevice`'s cpal-based approach, adapted to the
//! engine's opaque-integer device-id model (§3.1: sentinel `0` means
//! "default device").

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Sentinel device id meaning "whatever the OS currently calls default".
pub const DEFAULT_DEVICE_ID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Input,
    Output,
}

/// One enumerated device, with a stable-for-this-process integer id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: u32,
    pub label: String,
    pub kind: DeviceKind,
    pub is_default: bool,
}

/// Enumerates host audio devices. §6: "device enumeration calls that
/// return a leading 'default' slot followed by concrete devices".
pub trait DeviceEnumerator: Send + Sync {
    fn enumerate(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, GraphError>;

    /// Convenience wrapper that prepends the synthetic "default" slot
    /// (id `DEFAULT_DEVICE_ID`) ahead of the concrete devices, per §6.
    fn enumerate_with_default_slot(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, GraphError> {
        let mut devices = vec![DeviceDescriptor {
            id: DEFAULT_DEVICE_ID,
            label: "Default".to_string(),
            kind,
            is_default: true,
        }];
        devices.extend(self.enumerate(kind)?);
        Ok(devices)
    }

    /// Returns `true` if `device_id` is still present in the current
    /// enumeration — used by the device-change watcher (§4.5) to decide
    /// whether a selection must fall back to "default".
    fn device_exists(&self, kind: DeviceKind, device_id: u32) -> Result<bool, GraphError> {
        if device_id == DEFAULT_DEVICE_ID {
            return Ok(true);
        }
        Ok(self
            .enumerate(kind)?
            .iter()
            .any(|d| d.id == device_id))
    }
}

/// cpal-backed enumerator. cpal has no notion of a stable device id, so
/// ids are assigned by enumeration order within a single call and cached
/// by label across calls to stay stable while a device remains connected.
pub struct CpalDeviceEnumerator {
    next_id: std::sync::atomic::AtomicU32,
    known: parking_lot::Mutex<std::collections::HashMap<String, u32>>,
}

impl CpalDeviceEnumerator {
    pub fn new() -> Self {
        Self {
            // 0 is reserved for DEFAULT_DEVICE_ID.
            next_id: std::sync::atomic::AtomicU32::new(1),
            known: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn id_for_label(&self, label: &str) -> u32 {
        let mut known = self.known.lock();
        if let Some(&id) = known.get(label) {
            return id;
        }
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        known.insert(label.to_string(), id);
        id
    }
}

impl Default for CpalDeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceEnumerator for CpalDeviceEnumerator {
    fn enumerate(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, GraphError> {
        let host = cpal::default_host();

        let default_name = match kind {
            DeviceKind::Input => host.default_input_device().and_then(|d| d.name().ok()),
            DeviceKind::Output => host.default_output_device().and_then(|d| d.name().ok()),
        };

        let devices: Box<dyn Iterator<Item = cpal::Device>> = match kind {
            DeviceKind::Input => Box::new(
                host.input_devices()
                    .map_err(|e| GraphError::Internal(e.to_string()))?,
            ),
            DeviceKind::Output => Box::new(
                host.output_devices()
                    .map_err(|e| GraphError::Internal(e.to_string()))?,
            ),
        };

        let mut result = Vec::new();
        for device in devices {
            let Ok(label) = device.name() else { continue };
            let is_default = default_name.as_deref() == Some(label.as_str());
            result.push(DeviceDescriptor {
                id: self.id_for_label(&label),
                label,
                kind,
                is_default,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEnumerator(Vec<DeviceDescriptor>);

    impl DeviceEnumerator for FakeEnumerator {
        fn enumerate(&self, kind: DeviceKind) -> Result<Vec<DeviceDescriptor>, GraphError> {
            Ok(self.0.iter().filter(|d| d.kind == kind).cloned().collect())
        }
    }

    #[test]
    fn test_default_slot_prepended() {
        let fake = FakeEnumerator(vec![DeviceDescriptor {
            id: 5,
            label: "USB Mic".into(),
            kind: DeviceKind::Input,
            is_default: false,
        }]);
        let devices = fake.enumerate_with_default_slot(DeviceKind::Input).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, DEFAULT_DEVICE_ID);
        assert_eq!(devices[1].id, 5);
    }

    #[test]
    fn test_device_exists() {
        let fake = FakeEnumerator(vec![DeviceDescriptor {
            id: 5,
            label: "USB Mic".into(),
            kind: DeviceKind::Input,
            is_default: false,
        }]);
        assert!(fake.device_exists(DeviceKind::Input, DEFAULT_DEVICE_ID).unwrap());
        assert!(fake.device_exists(DeviceKind::Input, 5).unwrap());
        assert!(!fake.device_exists(DeviceKind::Input, 99).unwrap());
    }

    #[test]
    fn test_cpal_enumerator_ids_stable_across_calls() {
        let enumerator = CpalDeviceEnumerator::new();
        // Even without real hardware this must not panic and must be
        // internally consistent: calling twice with the same label (if
        // any devices exist) yields the same id.
        let first = enumerator.enumerate(DeviceKind::Output).unwrap_or_default();
        let second = enumerator.enumerate(DeviceKind::Output).unwrap_or_default();
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
        }
    }
}
