//! Telemetry service wire protocol.
//!
//! The service speaks JSON frames over a local WebSocket. Requests carry a
//! `path` and a `verb`; responses and pushes carry a `path` and an optional
//! `payload`. Payload *absence* on a per-device battery path is meaningful:
//! it signals that the device is unreachable (asleep).
//!
//! | Path | Verb | Payload (response) |
//! |------|------|--------------------|
//! | `/devices/list` | GET | `{deviceInfos: [...]}` |
//! | `/battery/{id}/state` | GET | `{deviceId, percentage, charging}` or absent |
//! | `/battery/state/changed` | SUBSCRIBE | pushes shaped like the per-device payload |
//!
//! Inbound frames are classified into the closed [`Inbound`] set up front so
//! the router can dispatch exhaustively instead of matching path substrings.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::error::Error;

/// WebSocket subprotocol the service expects.
pub const SERVICE_SUBPROTOCOL: &str = "json";

/// Path of the device-list snapshot.
pub const DEVICE_LIST_PATH: &str = "/devices/list";

/// Path of the battery-change subscription.
pub const BATTERY_CHANGED_PATH: &str = "/battery/state/changed";

/// Path of the battery-state query for one device.
pub fn battery_state_path(device_id: &str) -> String {
    format!("/battery/{device_id}/state")
}

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verb {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "SUBSCRIBE")]
    Subscribe,
}

/// Outbound request frame: `{"path": "...", "verb": "GET"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub path: String,
    pub verb: Verb,
}

impl RequestFrame {
    /// A one-shot query.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            verb: Verb::Get,
        }
    }

    /// A push subscription.
    pub fn subscribe(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            verb: Verb::Subscribe,
        }
    }
}

/// Inbound response/push frame before classification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PushFrame {
    pub path: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Battery payload carried by per-device responses and change pushes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryReading {
    pub device_id: String,
    pub percentage: u8,
    pub charging: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeviceListPayload {
    device_infos: Vec<Device>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Full device snapshot from `/devices/list`.
    DeviceList(Vec<Device>),
    /// A battery reading, from a per-device query or a change push.
    BatteryUpdate(BatteryReading),
    /// A per-device battery query came back without a payload: the device
    /// is unreachable. Normal state, not an error.
    BatteryAsleep { device_id: String },
    /// Anything else. Ignored, so unknown service paths stay harmless.
    Unknown,
}

/// Classify an inbound frame into one of the known message kinds.
///
/// Returns `Inbound::Unknown` for unrecognized paths and an [`Error::Decode`]
/// when a recognized path carries a malformed payload.
pub fn classify(frame: PushFrame) -> Result<Inbound, Error> {
    let path = frame.path.trim_start_matches('/');
    let segments: Vec<&str> = path.split('/').collect();

    match segments.as_slice() {
        ["devices", "list"] => {
            let payload: DeviceListPayload = match frame.payload {
                Some(value) => serde_json::from_value(value)?,
                None => DeviceListPayload::default(),
            };
            Ok(Inbound::DeviceList(payload.device_infos))
        }
        ["battery", "state", "changed"] => match frame.payload {
            Some(value) => Ok(Inbound::BatteryUpdate(serde_json::from_value(value)?)),
            // A change push without a payload names no device; nothing to do.
            None => Ok(Inbound::Unknown),
        },
        ["battery", device_id, "state"] if !device_id.is_empty() => match frame.payload {
            Some(value) => Ok(Inbound::BatteryUpdate(serde_json::from_value(value)?)),
            None => Ok(Inbound::BatteryAsleep {
                device_id: (*device_id).to_string(),
            }),
        },
        _ => Ok(Inbound::Unknown),
    }
}
