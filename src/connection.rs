//! Telemetry service connection lifecycle.
//!
//! One shared WebSocket connection feeds every widget instance. The manager
//! is an explicit state machine (`Disconnected → Connecting → Connected →
//! Disconnected`) with a single-flight guarantee: at most one connection
//! attempt is in flight at any time.
//!
//! Each attempt gets a fresh *generation*. The socket task tags every event
//! it emits with its generation, and the manager discards events from any
//! generation but the current one, so no handler of a torn-down connection
//! can interleave with a new one.
//!
//! While disconnected and at least one instance exists, a fixed-interval
//! reconnect timer re-arms after every failed attempt. It self-cancels when
//! a connection succeeds or the last instance is removed.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::plugin::Event;
use crate::protocol::{
    PushFrame, RequestFrame, BATTERY_CHANGED_PATH, DEVICE_LIST_PATH, SERVICE_SUBPROTOCOL,
};
use crate::Config;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the telemetry service connection, its reconnection policy, and the
/// outbound send path.
pub struct ConnectionManager {
    endpoint: String,
    reconnect_interval: Duration,
    state: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<RequestFrame>>,
    reconnect: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<Event>,
}

impl ConnectionManager {
    pub fn new(config: &Config, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            reconnect_interval: config.reconnect_interval,
            state: ConnectionState::Disconnected,
            generation: 0,
            outbound: None,
            reconnect: None,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Start a connection attempt. No-op unless currently disconnected.
    pub fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "connect ignored, attempt already in flight");
            return;
        }

        self.generation += 1;
        self.state = ConnectionState::Connecting;
        info!(
            endpoint = %self.endpoint,
            generation = self.generation,
            "connecting to telemetry service"
        );
        tokio::spawn(run_socket(
            self.endpoint.clone(),
            self.generation,
            self.events.clone(),
        ));
    }

    /// Send a request. Logs and drops when not connected; never errors.
    pub fn send(&mut self, frame: RequestFrame) {
        if self.state != ConnectionState::Connected {
            debug!(path = %frame.path, "not connected, request dropped");
            return;
        }
        let Some(outbound) = &self.outbound else {
            debug!(path = %frame.path, "no socket handle, request dropped");
            return;
        };
        if outbound.send(frame).is_err() {
            debug!("socket task gone, request dropped");
        }
    }

    /// Whether frames from this generation belong to the live connection.
    pub fn accepts(&self, generation: u64) -> bool {
        generation == self.generation && self.state == ConnectionState::Connected
    }

    /// Socket task reported a successful open.
    pub fn handle_opened(&mut self, generation: u64, outbound: mpsc::UnboundedSender<RequestFrame>) {
        if generation != self.generation {
            debug!(generation, "open from stale connection ignored");
            return;
        }

        self.state = ConnectionState::Connected;
        self.outbound = Some(outbound);
        self.cancel_reconnect();

        // Initialization: fetch the device snapshot and subscribe to
        // battery pushes.
        self.send(RequestFrame::get(DEVICE_LIST_PATH));
        self.send(RequestFrame::subscribe(BATTERY_CHANGED_PATH));
    }

    /// Socket task reported an error or close.
    pub fn handle_closed(&mut self, generation: u64, have_instances: bool) {
        if generation != self.generation {
            debug!(generation, "close from stale connection ignored");
            return;
        }

        info!(generation, "telemetry service connection closed");
        self.state = ConnectionState::Disconnected;
        self.outbound = None;
        self.maybe_schedule_reconnect(have_instances);
    }

    /// The armed reconnect timer fired.
    pub fn handle_reconnect_elapsed(&mut self, have_instances: bool) {
        self.reconnect = None;
        if !have_instances {
            debug!("no instances remain, reconnect abandoned");
            return;
        }
        if self.state == ConnectionState::Disconnected {
            self.connect();
        }
    }

    /// Arm the reconnect timer if disconnected, serving at least one
    /// instance, and not already armed.
    pub fn maybe_schedule_reconnect(&mut self, have_instances: bool) {
        if self.state != ConnectionState::Disconnected
            || !have_instances
            || self.reconnect.is_some()
        {
            return;
        }

        debug!(interval = ?self.reconnect_interval, "reconnect scheduled");
        let interval = self.reconnect_interval;
        let events = self.events.clone();
        self.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = events.send(Event::ReconnectElapsed);
        }));
    }

    /// Abort any armed reconnect timer.
    pub fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Mark this manager connected with a directly injected outbound
    /// channel, bypassing the socket task.
    #[cfg(test)]
    pub(crate) fn test_connect_direct(&mut self) -> mpsc::UnboundedReceiver<RequestFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.generation += 1;
        self.state = ConnectionState::Connected;
        self.outbound = Some(tx);
        rx
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}

/// Build the upgrade request the service expects: `json` subprotocol,
/// `file://` origin, and cache-busting headers.
fn client_request(endpoint: &str) -> Result<Request, Error> {
    let mut request = endpoint.into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        http::header::SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(SERVICE_SUBPROTOCOL),
    );
    headers.insert(http::header::ORIGIN, HeaderValue::from_static("file://"));
    headers.insert(http::header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        http::header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    Ok(request)
}

/// One connection generation: handshake, then pump outbound requests and
/// inbound frames until either side goes away.
async fn run_socket(endpoint: String, generation: u64, events: mpsc::UnboundedSender<Event>) {
    let request = match client_request(&endpoint) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "invalid service endpoint");
            let _ = events.send(Event::SocketClosed { generation });
            return;
        }
    };

    let (socket, _response) = match connect_async(request).await {
        Ok(ok) => ok,
        Err(err) => {
            warn!(error = %err, "telemetry service unreachable");
            let _ = events.send(Event::SocketClosed { generation });
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<RequestFrame>();
    if events
        .send(Event::SocketOpened {
            generation,
            outbound: outbound_tx,
        })
        .is_err()
    {
        return;
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            request = outbound_rx.recv() => match request {
                Some(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(error = %err, "unserializable request dropped");
                            continue;
                        }
                    };
                    debug!(path = %frame.path, verb = ?frame.verb, "request sent");
                    if let Err(err) = sink.send(Message::Text(text.into())).await {
                        warn!(error = %err, "send failed, closing socket");
                        break;
                    }
                }
                // The manager dropped its handle; this generation is done.
                None => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<PushFrame>(text.as_str()) {
                        Ok(frame) => {
                            let _ = events.send(Event::SocketFrame { generation, frame });
                        }
                        Err(err) => warn!(error = %err, "undecodable frame dropped"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "socket error");
                    break;
                }
            }
        }
    }

    let _ = events.send(Event::SocketClosed { generation });
}
