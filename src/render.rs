//! Render target handoff
//!
//! A render target is the UI-owned surface a session pushes its media into
//! (a video-capable element in the webview, a texture in the native player).
//! The core holds only a weak reference: it writes when the surface is still
//! alive and never manages UI lifetime.

use std::sync::Arc;

use webrtc::track::track_remote::TrackRemote;

/// Handle to a negotiated media source a render target can display
#[derive(Clone)]
pub enum MediaStream {
    /// Live remote track delivered over the peer connection
    WebRtc(Arc<TrackRemote>),
    /// Degraded image-poll feed, consumed directly by an image element
    ImagePoll { url: String },
}

impl MediaStream {
    /// Short label for logs and status captions
    pub fn kind(&self) -> &'static str {
        match self {
            MediaStream::WebRtc(_) => "webrtc",
            MediaStream::ImagePoll { .. } => "image-poll",
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaStream::WebRtc(track) => f
                .debug_struct("MediaStream::WebRtc")
                .field("track_id", &track.id())
                .finish(),
            MediaStream::ImagePoll { url } => f
                .debug_struct("MediaStream::ImagePoll")
                .field("url", url)
                .finish(),
        }
    }
}

/// UI surface a session writes media streams into
///
/// Implementations must tolerate repeated `attach` calls (a reconnect
/// replaces the stream) and `detach` after the surface stopped rendering.
pub trait RenderTarget: Send + Sync {
    /// Show a stream, replacing whatever was previously attached.
    fn attach(&self, stream: MediaStream);

    /// Clear the surface.
    fn detach(&self);
}
