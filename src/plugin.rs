//! Process-scoped plugin context and event loop.
//!
//! All mutable state (device registry, instance table, connection) lives
//! in one [`PluginContext`], constructed at plugin start and dropped at
//! plugin stop. There are no module-level globals; handlers receive the
//! context.
//!
//! Every external stimulus (widget lifecycle, settings change, property
//! inspector, socket open/frame/close, reconnect tick, render completion)
//! arrives as an [`Event`] on one unbounded channel, drained by a single
//! task. Events are processed one at a time, so no locking is needed and a
//! settings update fully applies its writes before any dependent outbound
//! query is sent.

use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::device::{DeviceOption, DeviceRegistry};
use crate::error::Error;
use crate::instance::{Instance, InstanceSettings, InstanceTable, WidgetId};
use crate::protocol::{battery_state_path, PushFrame, RequestFrame, DEVICE_LIST_PATH};
use crate::render::{Compositor, Renderer};
use crate::visual::{visual_for, Icon};
use crate::Config;

/// Image payload pushed to a widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetImage {
    /// Fully composited `data:image/png;base64,...` payload
    Composited(String),
    /// Plain icon asset path, used when composition fails
    AssetPath(PathBuf),
}

/// The host platform surface the core talks back to.
///
/// The widget runtime (lifecycle callbacks, property-inspector transport,
/// settings persistence) is an external collaborator; this trait is the
/// whole of what the core needs from it.
pub trait WidgetHost {
    /// Update a widget's title text.
    fn set_title(&mut self, widget: &WidgetId, title: &str);

    /// Update a widget's image.
    fn set_image(&mut self, widget: &WidgetId, image: &WidgetImage);

    /// Publish the device picker list to a widget's property inspector.
    fn send_device_options(&mut self, widget: &WidgetId, options: &[DeviceOption]);
}

/// Control messages from a widget's property inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InspectorMessage {
    /// Request the current device label/value list.
    GetDevices,
    /// Force a fresh device-list fetch from the service.
    RefreshDevices,
}

/// A discrete stimulus for the event loop.
#[derive(Debug)]
pub enum Event {
    /// A widget became visible.
    WillAppear {
        widget: WidgetId,
        settings: InstanceSettings,
    },
    /// A widget was removed.
    WillDisappear { widget: WidgetId },
    /// The user changed a widget's settings.
    SettingsChanged {
        widget: WidgetId,
        settings: InstanceSettings,
    },
    /// A property inspector sent a control message.
    Inspector {
        widget: WidgetId,
        message: InspectorMessage,
    },
    /// A socket generation completed its handshake.
    SocketOpened {
        generation: u64,
        outbound: mpsc::UnboundedSender<RequestFrame>,
    },
    /// A socket generation received a frame.
    SocketFrame { generation: u64, frame: PushFrame },
    /// A socket generation ended (handshake failure, error, or close).
    SocketClosed { generation: u64 },
    /// The reconnect timer fired.
    ReconnectElapsed,
    /// An off-loop composition finished.
    Rendered {
        widget: WidgetId,
        icon: Icon,
        result: Result<String, Error>,
    },
}

/// Owns all plugin state and reacts to events one at a time.
pub struct PluginContext<H: WidgetHost> {
    pub(crate) host: H,
    pub(crate) registry: DeviceRegistry,
    pub(crate) instances: InstanceTable,
    pub(crate) connection: ConnectionManager,
    pub(crate) renderer: Renderer,
}

impl<H: WidgetHost> PluginContext<H> {
    pub fn new(host: H, config: &Config, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            host,
            registry: DeviceRegistry::new(),
            instances: InstanceTable::new(),
            connection: ConnectionManager::new(config, events.clone()),
            renderer: Renderer::new(Compositor::new(config), events),
        }
    }

    /// Dispatch one event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::WillAppear { widget, settings } => self.on_appear(widget, settings),
            Event::WillDisappear { widget } => self.on_disappear(widget),
            Event::SettingsChanged { widget, settings } => {
                self.on_settings_changed(widget, settings)
            }
            Event::Inspector { widget, message } => self.on_inspector_message(widget, message),
            Event::SocketOpened {
                generation,
                outbound,
            } => self.connection.handle_opened(generation, outbound),
            Event::SocketFrame { generation, frame } => {
                if self.connection.accepts(generation) {
                    self.handle_frame(frame);
                } else {
                    debug!(generation, "frame from stale connection ignored");
                }
            }
            Event::SocketClosed { generation } => {
                let have_instances = !self.instances.is_empty();
                self.connection.handle_closed(generation, have_instances);
            }
            Event::ReconnectElapsed => {
                let have_instances = !self.instances.is_empty();
                self.connection.handle_reconnect_elapsed(have_instances);
            }
            Event::Rendered {
                widget,
                icon,
                result,
            } => self.apply_render(widget, icon, result),
        }
    }

    /// A widget became visible: track it, make sure the shared connection
    /// exists, and refresh the device list.
    pub fn on_appear(&mut self, widget: WidgetId, settings: InstanceSettings) {
        info!(widget = %widget, "widget appeared");
        self.instances
            .insert(widget.clone(), Instance::from_settings(&settings));

        self.connection.connect();
        self.connection.send(RequestFrame::get(DEVICE_LIST_PATH));
        self.refresh_visual(&widget);
    }

    /// Removal hook. Cancels reconnection once nothing is left to serve.
    pub fn on_disappear(&mut self, widget: WidgetId) {
        if self.instances.remove(&widget).is_some() {
            info!(widget = %widget, "widget removed");
        }
        if self.instances.is_empty() {
            self.connection.cancel_reconnect();
        }
    }

    /// Apply a settings change to one instance, then re-query its device so
    /// the widget reflects the change without waiting for the next push.
    pub fn on_settings_changed(&mut self, widget: WidgetId, settings: InstanceSettings) {
        let Some(instance) = self.instances.get_mut(&widget) else {
            warn!(widget = %widget, "settings change for unknown widget ignored");
            return;
        };

        instance.apply_settings(&settings);
        let device_id = instance.device_id.clone();

        self.refresh_visual(&widget);
        if self.connection.is_connected() && !device_id.is_empty() {
            self.connection
                .send(RequestFrame::get(battery_state_path(&device_id)));
        }
    }

    /// Serve a property-inspector control message.
    pub fn on_inspector_message(&mut self, widget: WidgetId, message: InspectorMessage) {
        match message {
            InspectorMessage::GetDevices => {
                let options = self.registry.options();
                self.host.send_device_options(&widget, &options);
            }
            InspectorMessage::RefreshDevices => {
                self.connection.send(RequestFrame::get(DEVICE_LIST_PATH));
            }
        }
    }

    /// Push an instance's current visual: title immediately, image via the
    /// off-loop compositor.
    pub(crate) fn refresh_visual(&mut self, widget: &WidgetId) {
        let Some(instance) = self.instances.get(widget) else {
            return;
        };

        let visual = visual_for(instance);
        let background = instance.background_color.clone();
        self.host.set_title(widget, &visual.title);
        self.renderer.submit(widget.clone(), background, visual.icon);
    }

    /// Apply a finished composition, degrading to the plain icon asset on
    /// failure so the widget never silently stalls.
    fn apply_render(&mut self, widget: WidgetId, icon: Icon, result: Result<String, Error>) {
        if self.instances.get(&widget).is_none() {
            debug!(widget = %widget, "render finished for removed widget, dropped");
            return;
        }

        match result {
            Ok(data_url) => {
                self.host
                    .set_image(&widget, &WidgetImage::Composited(data_url));
            }
            Err(err) => {
                warn!(widget = %widget, error = %err, "composition failed, using plain icon");
                let fallback = self.renderer.fallback_path(icon);
                self.host
                    .set_image(&widget, &WidgetImage::AssetPath(fallback));
            }
        }
    }
}

/// Cloneable entry point for feeding host events into the loop.
#[derive(Debug, Clone)]
pub struct PluginHandle {
    events: mpsc::UnboundedSender<Event>,
}

impl PluginHandle {
    pub fn will_appear(&self, widget: impl Into<WidgetId>, settings: InstanceSettings) {
        let _ = self.events.send(Event::WillAppear {
            widget: widget.into(),
            settings,
        });
    }

    pub fn will_disappear(&self, widget: impl Into<WidgetId>) {
        let _ = self.events.send(Event::WillDisappear {
            widget: widget.into(),
        });
    }

    pub fn settings_changed(&self, widget: impl Into<WidgetId>, settings: InstanceSettings) {
        let _ = self.events.send(Event::SettingsChanged {
            widget: widget.into(),
            settings,
        });
    }

    pub fn inspector_message(&self, widget: impl Into<WidgetId>, message: InspectorMessage) {
        let _ = self.events.send(Event::Inspector {
            widget: widget.into(),
            message,
        });
    }
}

/// The event loop: one context, one channel, events handled in order.
pub struct Runtime<H: WidgetHost> {
    context: PluginContext<H>,
    events: mpsc::UnboundedReceiver<Event>,
    handle: PluginHandle,
}

impl<H: WidgetHost> Runtime<H> {
    pub fn new(host: H, config: Config) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let context = PluginContext::new(host, &config, events_tx.clone());
        Self {
            context,
            events: events_rx,
            handle: PluginHandle { events: events_tx },
        }
    }

    /// Handle for the host integration to feed lifecycle events.
    pub fn handle(&self) -> PluginHandle {
        self.handle.clone()
    }

    /// Drain events until the plugin is stopped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.context.handle_event(event);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every host call for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct MockHost {
        pub titles: Vec<(WidgetId, String)>,
        pub images: Vec<(WidgetId, WidgetImage)>,
        pub options: Vec<(WidgetId, Vec<DeviceOption>)>,
    }

    impl WidgetHost for MockHost {
        fn set_title(&mut self, widget: &WidgetId, title: &str) {
            self.titles.push((widget.clone(), title.to_string()));
        }

        fn set_image(&mut self, widget: &WidgetId, image: &WidgetImage) {
            self.images.push((widget.clone(), image.clone()));
        }

        fn send_device_options(&mut self, widget: &WidgetId, options: &[DeviceOption]) {
            self.options.push((widget.clone(), options.to_vec()));
        }
    }

    /// A context with a capturing renderer and a directly-connected socket;
    /// returns the outbound request receiver and the raw event receiver.
    pub(crate) fn connected_context() -> (
        PluginContext<MockHost>,
        mpsc::UnboundedReceiver<RequestFrame>,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let (mut context, events) = disconnected_context();
        let outbound = context.connection.test_connect_direct();
        (context, outbound, events)
    }

    /// Like [`connected_context`] but with the connection left down.
    pub(crate) fn disconnected_context() -> (
        PluginContext<MockHost>,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let config = Config::default();
        let mut context = PluginContext::new(MockHost::default(), &config, events_tx);
        context.renderer = Renderer::capture(Compositor::new(&config));
        (context, events_rx)
    }
}
