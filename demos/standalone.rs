//! Run the plugin core against a live telemetry service, printing every
//! widget update to stdout.
//!
//! Run with:
//! ```sh
//! cargo run --example standalone
//! ```
//!
//! Override the endpoint with `BATTDECK_ENDPOINT=ws://127.0.0.1:9010`.

use battdeck::{
    Config, DeviceOption, InstanceSettings, Runtime, WidgetHost, WidgetId, WidgetImage,
};

/// A host that logs instead of driving a real deck.
struct StdoutHost;

impl WidgetHost for StdoutHost {
    fn set_title(&mut self, widget: &WidgetId, title: &str) {
        println!("[{widget}] title: {:?}", title);
    }

    fn set_image(&mut self, widget: &WidgetId, image: &WidgetImage) {
        match image {
            WidgetImage::Composited(data_url) => {
                println!("[{widget}] image: composited ({} bytes)", data_url.len())
            }
            WidgetImage::AssetPath(path) => {
                println!("[{widget}] image: asset {}", path.display())
            }
        }
    }

    fn send_device_options(&mut self, widget: &WidgetId, options: &[DeviceOption]) {
        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        println!("[{widget}] devices: {labels:?}");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let runtime = Runtime::new(StdoutHost, Config::default());
    let handle = runtime.handle();

    // One widget with default settings; it will bind to the first
    // battery-capable device the service reports.
    handle.will_appear("demo-widget", InstanceSettings::default());

    runtime.run().await;
}
