//! Device registry: the latest known set of battery-capable peripherals.

use serde::{Deserialize, Serialize};

/// A peripheral reported by the telemetry service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    /// Stable device id used in battery paths
    pub id: String,

    /// Human-readable name shown in the device picker
    pub display_name: String,

    /// Whether the device reports battery state at all
    pub battery_capable: bool,
}

/// A `{label, value}` pair for the property-inspector device picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceOption {
    pub label: String,
    pub value: String,
}

/// Holds the battery-capable subset of the most recent device snapshot,
/// in snapshot order.
///
/// The capability filter is applied exactly once, here at ingestion; no
/// other component re-filters. The set is replaced wholesale on every
/// snapshot; instances may keep referencing an id that disappeared from a
/// newer snapshot, which is tolerated until the user reassigns them.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held set with the battery-capable devices of a snapshot.
    pub fn apply_snapshot(&mut self, devices: Vec<Device>) {
        self.devices = devices.into_iter().filter(|d| d.battery_capable).collect();
    }

    /// First device in snapshot order, the deterministic default for
    /// instances that have no device assigned yet.
    pub fn first(&self) -> Option<&Device> {
        self.devices.first()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Project the registry into picker options for the property inspector.
    pub fn options(&self) -> Vec<DeviceOption> {
        self.devices
            .iter()
            .map(|d| DeviceOption {
                label: d.display_name.clone(),
                value: d.id.clone(),
            })
            .collect()
    }
}
