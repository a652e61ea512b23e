//! GStreamer initialization
//!
//! Decoding and encoding both go through [`init_gstreamer`], which runs
//! `gstreamer::init()` once per process and logs the library version.
//! Later calls return the cached outcome.

use std::sync::OnceLock;

static GSTREAMER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize GStreamer, returning the (cached) failure message if it is unusable
pub fn init_gstreamer() -> Result<(), String> {
    GSTREAMER_INIT
        .get_or_init(|| match gstreamer::init() {
            Ok(()) => {
                log::debug!("GStreamer initialized successfully");
                log_gstreamer_version();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to initialize GStreamer: {}", e);
                log::error!("Video decoding and encoding will not be available");
                Err(e.to_string())
            }
        })
        .clone()
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gstreamer::version();
    let nano_str = match nano {
        0 => String::new(),
        1 => " (CVS)".to_string(),
        2 => " (prerelease)".to_string(),
        _ => format!(" (nano: {})", nano),
    };
    log::info!("GStreamer version: {}.{}.{}{}", major, minor, micro, nano_str);
}
