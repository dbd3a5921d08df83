//! # battdeck
//!
//! Battery widgets for stream-deck style control surfaces.
//!
//! The crate is the core of a deck plugin: it keeps one resilient WebSocket
//! connection to a vendor's locally-running telemetry service and projects
//! the battery state of wireless peripherals onto any number of
//! independently configured widget instances, each bound to a chosen
//! device.
//!
//! What it handles:
//! - **Connection lifecycle**: single shared socket, explicit state
//!   machine, fixed-interval reconnection that self-cancels when there is
//!   nothing left to serve
//! - **Device reconciliation**: wholesale snapshots filtered to
//!   battery-capable devices, deterministic default assignment for widgets
//!   without a device
//! - **Visual mapping**: discrete icon band table plus title composition,
//!   and a 72x72 background + icon composite rendered off the event loop
//!
//! What it deliberately does not handle: the host platform's widget
//! lifecycle transport and settings persistence. Those arrive through the
//! [`WidgetHost`] trait and the [`PluginHandle`] event entry points.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use battdeck::{Config, InstanceSettings, Runtime, WidgetHost, WidgetImage, WidgetId};
//!
//! struct Host; // your deck SDK integration
//!
//! impl WidgetHost for Host {
//!     fn set_title(&mut self, widget: &WidgetId, title: &str) { /* ... */ }
//!     fn set_image(&mut self, widget: &WidgetId, image: &WidgetImage) { /* ... */ }
//!     fn send_device_options(&mut self, widget: &WidgetId, options: &[battdeck::DeviceOption]) { /* ... */ }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = Runtime::new(Host, Config::default());
//!     let handle = runtime.handle();
//!
//!     handle.will_appear("widget-1", InstanceSettings::default());
//!     runtime.run().await;
//! }
//! ```
//!
//! ## Service Contract
//!
//! The telemetry service listens on a fixed local endpoint and speaks JSON
//! frames over WebSocket (subprotocol `json`):
//!
//! | Path | Verb | Payload |
//! |------|------|---------|
//! | `/devices/list` | GET | `{deviceInfos: [...]}` |
//! | `/battery/{id}/state` | GET | `{deviceId, percentage, charging}`, or absent when the device is asleep |
//! | `/battery/state/changed` | SUBSCRIBE | pushes shaped like the per-device payload |

pub mod connection;
pub mod device;
mod error;
pub mod instance;
pub mod protocol;
pub mod render;
pub mod visual;

mod plugin;
mod router;

pub use connection::{ConnectionManager, ConnectionState};
pub use device::{Device, DeviceOption, DeviceRegistry};
pub use error::Error;
pub use instance::{Instance, InstanceSettings, InstanceTable, WidgetId};
pub use plugin::{
    Event, InspectorMessage, PluginContext, PluginHandle, Runtime, WidgetHost, WidgetImage,
};
pub use render::{Compositor, Renderer};
pub use visual::{compose_title, select_icon, visual_for, Icon, Visual};

use std::path::PathBuf;
use std::time::Duration;

/// Fixed local endpoint of the telemetry service.
pub const SERVICE_URL: &str = "ws://127.0.0.1:9010";

/// Seconds between reconnection attempts while disconnected.
pub const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Widget canvas edge length in pixels.
pub const CANVAS_SIZE: u32 = 72;

/// Width the icon is scaled to inside the canvas.
pub const ICON_WIDTH: u32 = 64;

/// Default widget background color.
pub const DEFAULT_BACKGROUND: &str = "#12142D";

/// Default number of blank lines between name and percentage.
pub const DEFAULT_TITLE_SPACING: u8 = 2;

/// Plugin configuration.
///
/// The defaults match the service contract; overrides exist for demos and
/// tests.
///
/// # Example
///
/// ```
/// use battdeck::Config;
///
/// let config = Config::default().with_asset_dir("imgs");
/// assert_eq!(config.endpoint, battdeck::SERVICE_URL);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Telemetry service endpoint
    pub endpoint: String,

    /// Delay between reconnection attempts
    pub reconnect_interval: Duration,

    /// Directory holding the icon assets
    pub asset_dir: PathBuf,

    /// Canvas edge length in pixels
    pub canvas_size: u32,

    /// Icon target width in pixels
    pub icon_width: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("BATTDECK_ENDPOINT")
                .unwrap_or_else(|_| SERVICE_URL.to_string()),
            reconnect_interval: Duration::from_secs(RECONNECT_INTERVAL_SECS),
            asset_dir: PathBuf::from("assets"),
            canvas_size: CANVAS_SIZE,
            icon_width: ICON_WIDTH,
        }
    }
}

impl Config {
    /// Override the service endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the icon asset directory.
    #[must_use]
    pub fn with_asset_dir(mut self, asset_dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = asset_dir.into();
        self
    }

    /// Override the reconnect interval.
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}
