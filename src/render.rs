//! Widget image composition.
//!
//! Renders a fixed-size square canvas flat-filled with the instance's
//! background color, overlays the selected icon asset scaled to a fixed
//! width (aspect preserved, centered on both axes), and exports the result
//! as a `data:image/png;base64,...` payload the widget-update interface can
//! consume directly.
//!
//! Composition runs off the event loop (see [`Renderer`]). On any failure
//! (missing asset, bad hex color, decode error) the caller falls back to
//! pushing the plain icon path so the widget never silently stalls.

use std::io::Cursor;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{GenericImageView, Rgba, RgbaImage};
use tokio::sync::mpsc;

use crate::error::Error;
use crate::instance::WidgetId;
use crate::plugin::Event;
use crate::visual::Icon;
use crate::Config;

/// Composites background + icon into an encoded widget image.
#[derive(Debug, Clone)]
pub struct Compositor {
    asset_dir: PathBuf,
    canvas_size: u32,
    icon_width: u32,
}

impl Compositor {
    pub fn new(config: &Config) -> Self {
        Self {
            asset_dir: config.asset_dir.clone(),
            canvas_size: config.canvas_size,
            icon_width: config.icon_width,
        }
    }

    /// Absolute path of an icon asset.
    pub fn asset_path(&self, icon: Icon) -> PathBuf {
        self.asset_dir.join(icon.asset_name())
    }

    /// Compose the widget image and return it as a PNG data URL.
    pub fn compose(&self, background: &str, icon: Icon) -> Result<String, Error> {
        let fill = parse_hex_color(background)?;
        let mut canvas = RgbaImage::from_pixel(self.canvas_size, self.canvas_size, fill);

        let asset = image::open(self.asset_path(icon))?;
        let (width, height) = asset.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Render(format!(
                "icon asset {:?} has zero size",
                self.asset_path(icon)
            )));
        }

        let scale = self.icon_width as f32 / width as f32;
        let target_height = ((height as f32 * scale).round() as u32).max(1);
        let scaled = image::imageops::resize(
            &asset.to_rgba8(),
            self.icon_width,
            target_height,
            image::imageops::FilterType::Lanczos3,
        );

        let x = (self.canvas_size as i64 - self.icon_width as i64) / 2;
        let y = (self.canvas_size as i64 - target_height as i64) / 2;
        image::imageops::overlay(&mut canvas, &scaled, x, y.max(0));

        let mut png = Vec::new();
        canvas.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
    }
}

/// Parse a `#RRGGBB` hex color into a fully opaque pixel.
fn parse_hex_color(color: &str) -> Result<Rgba<u8>, Error> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidColor(color.to_string()));
    }

    let channel = |range| u8::from_str_radix(&hex[range], 16).unwrap_or(0);
    Ok(Rgba([channel(0..2), channel(2..4), channel(4..6), 255]))
}

/// A queued composition for one widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub widget: WidgetId,
    pub background: String,
    pub icon: Icon,
}

enum RenderSink {
    /// Spawn composition on a blocking worker; completion re-enters the
    /// event loop as [`Event::Rendered`].
    Events(mpsc::UnboundedSender<Event>),
    #[cfg(test)]
    Capture(Vec<RenderRequest>),
}

/// Dispatches render requests off the event loop.
///
/// Newer battery events may submit a newer render while an older one is
/// still in flight; completions are applied in arrival order, so an older
/// render finishing late can win. Tolerated as eventual consistency.
pub struct Renderer {
    compositor: Compositor,
    sink: RenderSink,
}

impl Renderer {
    pub fn new(compositor: Compositor, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            compositor,
            sink: RenderSink::Events(events),
        }
    }

    #[cfg(test)]
    pub(crate) fn capture(compositor: Compositor) -> Self {
        Self {
            compositor,
            sink: RenderSink::Capture(Vec::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn captured(&self) -> &[RenderRequest] {
        match &self.sink {
            RenderSink::Capture(requests) => requests,
            RenderSink::Events(_) => &[],
        }
    }

    /// Fallback image reference used when composition fails.
    pub fn fallback_path(&self, icon: Icon) -> PathBuf {
        self.compositor.asset_path(icon)
    }

    /// Queue a composition. Must be called from within a tokio runtime.
    pub fn submit(&mut self, widget: WidgetId, background: String, icon: Icon) {
        match &mut self.sink {
            RenderSink::Events(events) => {
                let compositor = self.compositor.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let result = match tokio::task::spawn_blocking(move || {
                        compositor.compose(&background, icon)
                    })
                    .await
                    {
                        Ok(result) => result,
                        Err(err) => Err(Error::Render(format!("render task failed: {err}"))),
                    };
                    let _ = events.send(Event::Rendered {
                        widget,
                        icon,
                        result,
                    });
                });
            }
            #[cfg(test)]
            RenderSink::Capture(requests) => requests.push(RenderRequest {
                widget,
                background,
                icon,
            }),
        }
    }
}
