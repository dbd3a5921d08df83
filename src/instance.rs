//! Per-widget instance state, keyed by widget identity.
//!
//! One [`Instance`] exists per visible widget. It owns both the
//! user-configured settings and the live battery view for the bound device,
//! so nothing needs to join parallel collections at event time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_BACKGROUND, DEFAULT_TITLE_SPACING};

/// Opaque widget identity assigned by the host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WidgetId(String);

impl WidgetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WidgetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for WidgetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Settings supplied by the host when a widget appears or is reconfigured.
///
/// All fields are optional; absent fields keep their current (or default)
/// value when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_spacing: Option<u8>,
}

/// One widget's configuration and live battery view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Bound device id; empty until resolved (by settings or by default
    /// assignment from the first snapshot)
    pub device_id: String,

    /// User-facing name shown above the percentage; empty hides the name line
    pub display_name: String,

    /// Widget background as a `#RRGGBB` hex color
    pub background_color: String,

    /// Blank lines between the name and the percentage
    pub title_spacing: u8,

    /// Last reported charge level, 0..=100
    pub percentage: u8,

    /// Whether the device reported it is charging
    pub charging: bool,

    /// Set when the device's battery query came back empty (unreachable);
    /// cleared by the next battery reading
    pub asleep: bool,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            display_name: String::new(),
            background_color: DEFAULT_BACKGROUND.to_string(),
            title_spacing: DEFAULT_TITLE_SPACING,
            percentage: 100,
            charging: false,
            asleep: false,
        }
    }
}

impl Instance {
    /// Build a fresh instance from defaults merged with supplied settings.
    pub fn from_settings(settings: &InstanceSettings) -> Self {
        let mut instance = Self::default();
        instance.apply_settings(settings);
        instance
    }

    /// Apply the provided settings fields, leaving absent fields untouched.
    pub fn apply_settings(&mut self, settings: &InstanceSettings) {
        if let Some(device_id) = &settings.device_id {
            self.device_id = device_id.clone();
        }
        if let Some(display_name) = &settings.display_name {
            self.display_name = display_name.clone();
        }
        if let Some(background_color) = &settings.background_color {
            self.background_color = background_color.clone();
        }
        if let Some(title_spacing) = settings.title_spacing {
            self.title_spacing = title_spacing;
        }
    }

    /// Record a battery reading. Wakes the instance if it was asleep.
    pub fn set_battery(&mut self, percentage: u8, charging: bool) {
        self.percentage = percentage.min(100);
        self.charging = charging;
        self.asleep = false;
    }

    /// Mark the bound device unreachable.
    pub fn set_asleep(&mut self) {
        self.asleep = true;
    }

    pub fn has_device(&self) -> bool {
        !self.device_id.is_empty()
    }
}

/// All live instances, keyed by widget identity.
#[derive(Debug, Default)]
pub struct InstanceTable {
    instances: BTreeMap<WidgetId, Instance>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the instance for a widget.
    pub fn insert(&mut self, widget: WidgetId, instance: Instance) {
        self.instances.insert(widget, instance);
    }

    pub fn remove(&mut self, widget: &WidgetId) -> Option<Instance> {
        self.instances.remove(widget)
    }

    pub fn get(&self, widget: &WidgetId) -> Option<&Instance> {
        self.instances.get(widget)
    }

    pub fn get_mut(&mut self, widget: &WidgetId) -> Option<&mut Instance> {
        self.instances.get_mut(widget)
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WidgetId, &Instance)> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&WidgetId, &mut Instance)> {
        self.instances.iter_mut()
    }

    pub fn widget_ids(&self) -> Vec<WidgetId> {
        self.instances.keys().cloned().collect()
    }

    /// Widgets whose instance is bound to the given device.
    pub fn bound_to(&self, device_id: &str) -> Vec<WidgetId> {
        self.instances
            .iter()
            .filter(|(_, instance)| instance.device_id == device_id)
            .map(|(widget, _)| widget.clone())
            .collect()
    }

    /// Widgets whose instance has no device assigned.
    pub fn unresolved(&self) -> Vec<WidgetId> {
        self.instances
            .iter()
            .filter(|(_, instance)| !instance.has_device())
            .map(|(widget, _)| widget.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let instance = Instance::default();
        assert_eq!(instance.background_color, "#12142D");
        assert_eq!(instance.title_spacing, 2);
        assert_eq!(instance.percentage, 100);
        assert!(!instance.charging);
        assert!(!instance.asleep);
        assert!(!instance.has_device());
    }

    #[test]
    fn test_settings_parsing() {
        let settings: InstanceSettings = serde_json::from_str(
            r##"{"deviceId":"dev001","displayName":"Headset","backgroundColor":"#000000","titleSpacing":1}"##,
        )
        .unwrap();

        let instance = Instance::from_settings(&settings);
        assert_eq!(instance.device_id, "dev001");
        assert_eq!(instance.display_name, "Headset");
        assert_eq!(instance.background_color, "#000000");
        assert_eq!(instance.title_spacing, 1);
        // Live state always starts from defaults until telemetry confirms.
        assert_eq!(instance.percentage, 100);
        assert!(!instance.charging);
    }

    #[test]
    fn test_partial_settings_keep_current_fields() {
        let mut instance = Instance::from_settings(&InstanceSettings {
            device_id: Some("dev001".to_string()),
            display_name: Some("Headset".to_string()),
            ..Default::default()
        });

        instance.apply_settings(&InstanceSettings {
            background_color: Some("#FFFFFF".to_string()),
            ..Default::default()
        });

        assert_eq!(instance.device_id, "dev001");
        assert_eq!(instance.display_name, "Headset");
        assert_eq!(instance.background_color, "#FFFFFF");
    }

    #[test]
    fn test_battery_reading_wakes_instance() {
        let mut instance = Instance::default();
        instance.set_asleep();
        assert!(instance.asleep);

        instance.set_battery(42, true);
        assert_eq!(instance.percentage, 42);
        assert!(instance.charging);
        assert!(!instance.asleep);
    }

    #[test]
    fn test_battery_reading_is_clamped() {
        let mut instance = Instance::default();
        instance.set_battery(250, false);
        assert_eq!(instance.percentage, 100);
    }

    #[test]
    fn test_table_lookups() {
        let mut table = InstanceTable::new();
        let mut bound = Instance::default();
        bound.device_id = "dev001".to_string();
        table.insert("widget-a".into(), bound.clone());
        table.insert("widget-b".into(), bound);
        table.insert("widget-c".into(), Instance::default());

        assert_eq!(
            table.bound_to("dev001"),
            vec![WidgetId::from("widget-a"), WidgetId::from("widget-b")]
        );
        assert_eq!(table.unresolved(), vec![WidgetId::from("widget-c")]);

        table.remove(&"widget-a".into());
        assert_eq!(table.len(), 2);
    }
}
