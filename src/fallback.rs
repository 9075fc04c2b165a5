//! Image-poll fallback transport
//!
//! When WebRTC is disabled or has exhausted its retries, a camera tile can
//! be rendered from the media server's continuous still-image feed instead
//! (`GET /mjpeg/{camera_id}`). This is a degraded mode with no connection
//! state machine beyond enabled/disabled; whether a tile actually switches
//! to it is decided at the UI layer, never forced by the core.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{FallbackConfig, StreamConfig};

/// Image-poll fallback URL source
pub struct ImagePollFallback {
    base_url: String,
    enabled: AtomicBool,
}

impl ImagePollFallback {
    pub fn new(stream: &StreamConfig, config: &FallbackConfig) -> Self {
        Self {
            base_url: stream.base_url.trim_end_matches('/').to_string(),
            enabled: AtomicBool::new(config.enabled),
        }
    }

    /// Feed URL for a camera, regardless of the enabled toggle
    pub fn stream_url(&self, camera_id: &str) -> String {
        format!("{}/mjpeg/{}", self.base_url, urlencoding::encode(camera_id))
    }

    /// Feed URL when fallback is enabled, `None` otherwise
    pub fn url_if_enabled(&self, camera_id: &str) -> Option<String> {
        self.is_enabled().then(|| self.stream_url(camera_id))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}
