//! Error types for the battdeck core.

use thiserror::Error;

/// Errors that can occur while talking to the telemetry service or
/// rendering widget imagery.
///
/// None of these are fatal to the hosting process: connection errors are
/// retried by the reconnect policy, send errors are dropped, and render
/// errors degrade to an uncomposited fallback image.
#[derive(Debug, Error)]
pub enum Error {
    /// WebSocket handshake or transport failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// Inbound frame could not be decoded
    #[error("frame decode error: {0}")]
    Decode(String),

    /// Background color string is not a `#RRGGBB` hex color
    #[error("invalid background color {0:?}")]
    InvalidColor(String),

    /// Icon composition failed (missing asset, decode error, encode error)
    #[error("render error: {0}")]
    Render(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Render(err.to_string())
    }
}
