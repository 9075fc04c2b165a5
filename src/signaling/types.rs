//! Signaling wire types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SDP offer created by the local peer handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpOffer {
    /// SDP content
    pub sdp: String,
}

impl SdpOffer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into() }
    }
}

/// SDP answer returned by the media server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpAnswer {
    /// SDP content
    pub sdp: String,
}

impl SdpAnswer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into() }
    }
}

/// ICE candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    /// Username fragment
    #[serde(rename = "usernameFragment", skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }
}

/// Per-camera connection source the offer is negotiated for.
///
/// The media server opens the camera's RTSP feed itself, so the offer may
/// carry the source URL and credentials alongside the SDP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSource {
    /// Camera id (Registry key)
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl CameraSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rtsp_url: None,
            username: None,
            password: None,
        }
    }
}

/// Offer request body (`POST /webrtc/offer/{camera_id}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    /// SDP offer
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
    /// Camera id (repeated in the body for the media server's session table)
    pub camera_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl OfferRequest {
    pub fn new(camera: &CameraSource, offer: &SdpOffer) -> Self {
        Self {
            sdp: offer.sdp.clone(),
            sdp_type: "offer".to_string(),
            camera_id: camera.id.clone(),
            rtsp_url: camera.rtsp_url.clone(),
            username: camera.username.clone(),
            password: camera.password.clone(),
        }
    }
}

/// Answer response body (`200` from the offer endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// SDP answer
    pub sdp: String,
    #[serde(rename = "type", default = "default_answer")]
    pub sdp_type: String,
}

fn default_answer() -> String {
    "answer".to_string()
}

/// Signaling failure classification
///
/// `ServerRejected` specifically covers the media server refusing the offer
/// (an existing session for the camera answers `409`); the correct response
/// is to wait out the conflicting session and retry once, not abandon the
/// camera. `Network` covers transport failures and server errors, `Timeout`
/// an elapsed request deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingErrorKind {
    Network,
    ServerRejected,
    Timeout,
}

impl std::fmt::Display for SignalingErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalingErrorKind::Network => write!(f, "network"),
            SignalingErrorKind::ServerRejected => write!(f, "server-rejected"),
            SignalingErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// Signaling error
#[derive(Debug, Clone, Error)]
#[error("signaling {kind} for camera {camera_id}: {message}")]
pub struct SignalingError {
    pub kind: SignalingErrorKind,
    pub camera_id: String,
    pub message: String,
}

impl SignalingError {
    pub fn new(
        kind: SignalingErrorKind,
        camera_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            camera_id: camera_id.into(),
            message: message.into(),
        }
    }

    pub fn network(camera_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SignalingErrorKind::Network, camera_id, message)
    }

    pub fn rejected(camera_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SignalingErrorKind::ServerRejected, camera_id, message)
    }

    pub fn timeout(camera_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(SignalingErrorKind::Timeout, camera_id, message)
    }
}
