//! Inbound frame routing.
//!
//! Frames are classified once ([`crate::protocol::classify`]) and dispatched
//! exhaustively: device snapshots reconcile the registry and resolve
//! defaults, battery readings fan out to every instance bound to the
//! device, and payload-less battery responses put those instances to sleep.

use tracing::{debug, info, warn};

use crate::device::Device;
use crate::plugin::{PluginContext, WidgetHost};
use crate::protocol::{
    battery_state_path, classify, BatteryReading, Inbound, PushFrame, RequestFrame,
};

impl<H: WidgetHost> PluginContext<H> {
    /// Decode and apply one inbound frame.
    pub fn handle_frame(&mut self, frame: PushFrame) {
        match classify(frame) {
            Ok(Inbound::DeviceList(devices)) => self.apply_device_snapshot(devices),
            Ok(Inbound::BatteryUpdate(reading)) => self.apply_battery_update(reading),
            Ok(Inbound::BatteryAsleep { device_id }) => self.apply_battery_asleep(&device_id),
            Ok(Inbound::Unknown) => debug!("unrecognized frame ignored"),
            Err(err) => warn!(error = %err, "malformed frame dropped"),
        }
    }

    /// Replace the registry, give unresolved instances the deterministic
    /// default device, query battery for the newly resolved ones, and
    /// republish the picker list.
    fn apply_device_snapshot(&mut self, devices: Vec<Device>) {
        self.registry.apply_snapshot(devices);
        info!(devices = self.registry.len(), "device snapshot applied");

        // First device in snapshot order; an empty snapshot leaves
        // unresolved instances unresolved and skips the battery query.
        if let Some(default_id) = self.registry.first().map(|device| device.id.clone()) {
            for widget in self.instances.unresolved() {
                if let Some(instance) = self.instances.get_mut(&widget) {
                    instance.device_id = default_id.clone();
                }
                debug!(widget = %widget, device = %default_id, "default device assigned");
                self.connection
                    .send(RequestFrame::get(battery_state_path(&default_id)));
            }
        }

        let options = self.registry.options();
        for widget in self.instances.widget_ids() {
            self.host.send_device_options(&widget, &options);
        }
    }

    /// One push may update several instances bound to the same device.
    fn apply_battery_update(&mut self, reading: BatteryReading) {
        let affected = self.instances.bound_to(&reading.device_id);
        if affected.is_empty() {
            debug!(device = %reading.device_id, "battery reading for unbound device");
            return;
        }

        for widget in affected {
            if let Some(instance) = self.instances.get_mut(&widget) {
                instance.set_battery(reading.percentage, reading.charging);
            }
            self.refresh_visual(&widget);
        }
    }

    /// The device is unreachable: asleep visual for everything bound to it.
    fn apply_battery_asleep(&mut self, device_id: &str) {
        for widget in self.instances.bound_to(device_id) {
            if let Some(instance) = self.instances.get_mut(&widget) {
                instance.set_asleep();
            }
            self.refresh_visual(&widget);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::instance::InstanceSettings;
    use crate::plugin::testing::connected_context;
    use crate::protocol::{PushFrame, RequestFrame, DEVICE_LIST_PATH};
    use crate::visual::Icon;

    fn frame(json: &str) -> PushFrame {
        serde_json::from_str(json).unwrap()
    }

    fn settings_for(device_id: &str) -> InstanceSettings {
        InstanceSettings {
            device_id: Some(device_id.to_string()),
            ..Default::default()
        }
    }

    const SNAPSHOT: &str = r#"{"path":"/devices/list","payload":{"deviceInfos":[
        {"id":"dev001","displayName":"Headset","batteryCapable":true},
        {"id":"dev002","displayName":"Mouse Pad","batteryCapable":false},
        {"id":"dev003","displayName":"Mouse","batteryCapable":true}
    ]}}"#;

    #[test]
    fn test_snapshot_assigns_default_and_queries_battery() {
        let (mut context, mut outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), InstanceSettings::default());
        let _ = outbound.try_recv(); // device-list request from appear

        context.handle_frame(frame(SNAPSHOT));

        let instance = context.instances.get(&"widget-a".into()).unwrap();
        assert_eq!(instance.device_id, "dev001");
        assert_eq!(
            outbound.try_recv().unwrap(),
            RequestFrame::get("/battery/dev001/state")
        );
    }

    #[test]
    fn test_snapshot_keeps_resolved_instances_bound() {
        let (mut context, mut outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), settings_for("dev003"));
        let _ = outbound.try_recv();

        context.handle_frame(frame(SNAPSHOT));

        let instance = context.instances.get(&"widget-a".into()).unwrap();
        assert_eq!(instance.device_id, "dev003");
        // No default assignment, so no battery query either.
        assert!(outbound.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_republishes_options_to_every_widget() {
        let (mut context, _outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), settings_for("dev001"));
        context.on_appear("widget-b".into(), settings_for("dev003"));

        context.handle_frame(frame(SNAPSHOT));

        assert_eq!(context.host.options.len(), 2);
        let labels: Vec<&str> = context.host.options[0]
            .1
            .iter()
            .map(|option| option.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Headset", "Mouse"]);
    }

    #[test]
    fn test_empty_snapshot_leaves_instances_unresolved() {
        let (mut context, mut outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), InstanceSettings::default());
        let _ = outbound.try_recv();

        context.handle_frame(frame(
            r#"{"path":"/devices/list","payload":{"deviceInfos":[]}}"#,
        ));

        let instance = context.instances.get(&"widget-a".into()).unwrap();
        assert!(!instance.has_device());
        assert!(outbound.try_recv().is_err(), "no battery query without a device");
    }

    #[test]
    fn test_battery_push_fans_out_to_bound_instances_only() {
        let (mut context, _outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), settings_for("dev001"));
        context.on_appear("widget-b".into(), settings_for("dev001"));
        context.on_appear("widget-c".into(), settings_for("dev003"));

        let before = context.instances.get(&"widget-c".into()).unwrap().clone();
        context.host.titles.clear();

        context.handle_frame(frame(
            r#"{"path":"/battery/state/changed","payload":{"deviceId":"dev001","percentage":63,"charging":false}}"#,
        ));

        assert_eq!(context.instances.get(&"widget-a".into()).unwrap().percentage, 63);
        assert_eq!(context.instances.get(&"widget-b".into()).unwrap().percentage, 63);
        assert_eq!(context.instances.get(&"widget-c".into()).unwrap(), &before);

        assert_eq!(
            context.host.titles,
            vec![
                ("widget-a".into(), "63%".to_string()),
                ("widget-b".into(), "63%".to_string()),
            ]
        );
    }

    #[test]
    fn test_asleep_frame_blanks_title_and_uses_asleep_icon() {
        let (mut context, _outbound, _events) = connected_context();
        context.on_appear(
            "widget-a".into(),
            InstanceSettings {
                device_id: Some("dev001".to_string()),
                display_name: Some("Headset".to_string()),
                ..Default::default()
            },
        );
        context.on_appear("widget-b".into(), settings_for("dev003"));
        context.host.titles.clear();

        context.handle_frame(frame(r#"{"path":"/battery/dev001/state"}"#));

        assert_eq!(
            context.host.titles,
            vec![("widget-a".into(), String::new())]
        );
        let last_render = context.renderer.captured().last().unwrap();
        assert_eq!(last_render.icon, Icon::Asleep);
        assert!(context.instances.get(&"widget-a".into()).unwrap().asleep);
        assert!(!context.instances.get(&"widget-b".into()).unwrap().asleep);
    }

    #[test]
    fn test_unknown_and_malformed_frames_are_ignored() {
        let (mut context, _outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), settings_for("dev001"));
        context.host.titles.clear();

        context.handle_frame(frame(r#"{"path":"/firmware/version","payload":{}}"#));
        context.handle_frame(frame(
            r#"{"path":"/battery/dev001/state","payload":{"percentage":"full"}}"#,
        ));

        assert!(context.host.titles.is_empty());
    }

    /// The end-to-end scenario from the service contract documentation.
    #[test]
    fn test_snapshot_then_push_then_asleep_scenario() {
        let (mut context, mut outbound, _events) = connected_context();
        context.on_appear("widget-a".into(), InstanceSettings::default());
        assert_eq!(
            outbound.try_recv().unwrap(),
            RequestFrame::get(DEVICE_LIST_PATH)
        );

        // Snapshot with one capable and one incapable device.
        context.handle_frame(frame(
            r#"{"path":"/devices/list","payload":{"deviceInfos":[
                {"id":"dev001","displayName":"Headset","batteryCapable":true},
                {"id":"dev002","displayName":"Mouse Pad","batteryCapable":false}
            ]}}"#,
        ));
        assert_eq!(context.registry.len(), 1);
        assert_eq!(
            context.instances.get(&"widget-a".into()).unwrap().device_id,
            "dev001"
        );
        assert_eq!(
            outbound.try_recv().unwrap(),
            RequestFrame::get("/battery/dev001/state")
        );

        // Charging push: charging-high icon, bare percentage title.
        context.host.titles.clear();
        context.handle_frame(frame(
            r#"{"path":"/battery/state/changed","payload":{"deviceId":"dev001","percentage":85,"charging":true}}"#,
        ));
        assert_eq!(
            context.host.titles,
            vec![("widget-a".into(), "85%".to_string())]
        );
        assert_eq!(
            context.renderer.captured().last().unwrap().icon,
            Icon::ChargingHigh
        );

        // Payload-less response: asleep visual.
        context.host.titles.clear();
        context.handle_frame(frame(r#"{"path":"/battery/dev001/state"}"#));
        assert_eq!(
            context.host.titles,
            vec![("widget-a".into(), String::new())]
        );
        assert_eq!(
            context.renderer.captured().last().unwrap().icon,
            Icon::Asleep
        );
    }
}
