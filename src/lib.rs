//! vms-viewer - Live-view connection manager for the VMS viewer applications
//!
//! This crate provides the per-camera WebRTC signaling state machine used by
//! the desktop and enterprise web viewers:
//! - Session: per-camera connection lifecycle (negotiate, supervise, teardown)
//! - Signaling: SDP offer/answer and ICE exchange with the media server
//! - Policy: conflict grace retry, bounded backoff, image-poll fallback
//! - Registry: process-wide camera id -> session table with bulk teardown
//!
//! # Architecture
//!
//! ```text
//! UI tile ----start/stop----> SessionRegistry
//!                                  |
//!                                  v
//!                          SessionController (one task per camera)
//!                             |         |
//!                       MediaPeer   Signaling ----HTTP----> media server
//!                             |
//!                      RenderTarget (weak) <---- media stream
//! ```
//!
//! Stream negotiation internals, recording storage, and discovery live in
//! external services; this crate only drives their HTTP/WebRTC interfaces.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod fallback;
pub mod peer;
pub mod policy;
pub mod registry;
pub mod render;
pub mod session;
pub mod signaling;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, Camera};
pub use config::{ConfigStore, ViewerConfig};
pub use error::{Result, ViewerError};
pub use events::{EventBus, SessionEvent};
pub use fallback::ImagePollFallback;
pub use peer::{MediaPeer, PeerEvent, PeerFactory, WebRtcPeerFactory};
pub use policy::{FailureKind, RetryDecision, RetryPolicy};
pub use registry::SessionRegistry;
pub use render::{MediaStream, RenderTarget};
pub use session::{ConnectionState, Session, Transport};
pub use signaling::{
    CameraSource, HttpSignalingClient, IceCandidate, SdpAnswer, SdpOffer, Signaling,
    SignalingError, SignalingErrorKind,
};
