//! Signaling client for the media server
//!
//! Exchanges SDP offer/answer and ICE candidates with the remote media
//! server over HTTP:
//!
//! ```text
//! POST   /webrtc/offer/{camera_id}   offer -> answer (409 = session conflict)
//! POST   /webrtc/ice/{camera_id}     trickle ICE, best-effort
//! DELETE /webrtc/{camera_id}         server-side session teardown, best-effort
//! ```
//!
//! All network and error-shape knowledge lives here, behind the [`Signaling`]
//! trait, so connection lifecycle logic and retry policy can be unit-tested
//! without real network calls.

pub mod types;

pub use types::{
    AnswerResponse, CameraSource, IceCandidate, OfferRequest, SdpAnswer, SdpOffer, SignalingError,
    SignalingErrorKind,
};

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::{Result, ViewerError};

/// Signaling exchange with the media server, one session per camera id.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// POST the local offer and return the parsed remote answer.
    async fn negotiate(
        &self,
        camera: &CameraSource,
        offer: &SdpOffer,
    ) -> std::result::Result<SdpAnswer, SignalingError>;

    /// Best-effort delivery of a locally discovered ICE candidate.
    /// Failures are logged, not propagated.
    async fn send_candidate(&self, camera_id: &str, candidate: &IceCandidate);

    /// Best-effort release of server-side resources for the camera's session.
    /// Failures are logged, not propagated.
    async fn teardown(&self, camera_id: &str);
}

/// HTTP signaling client
pub struct HttpSignalingClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: RwLock<Option<String>>,
}

impl HttpSignalingClient {
    /// Create a client from the stream endpoint configuration
    pub fn new(config: &StreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ViewerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: RwLock::new(None),
        })
    }

    /// Attach a bearer token to subsequent signaling calls
    pub fn set_bearer_token(&self, token: Option<String>) {
        *self.bearer_token.write() = token;
    }

    fn url(&self, path: &str, camera_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            path,
            urlencoding::encode(camera_id)
        )
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.bearer_token.read().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl Signaling for HttpSignalingClient {
    async fn negotiate(
        &self,
        camera: &CameraSource,
        offer: &SdpOffer,
    ) -> std::result::Result<SdpAnswer, SignalingError> {
        let url = self.url("webrtc/offer", &camera.id);
        let body = OfferRequest::new(camera, offer);

        debug!(camera_id = %camera.id, %url, "Sending SDP offer");

        let response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SignalingError::timeout(&camera.id, e.to_string())
                } else {
                    SignalingError::network(&camera.id, e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let answer: AnswerResponse = response.json().await.map_err(|e| {
                SignalingError::network(&camera.id, format!("malformed answer: {}", e))
            })?;
            debug!(camera_id = %camera.id, "Received SDP answer");
            return Ok(SdpAnswer::new(answer.sdp));
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            // An earlier session for this camera is still live on the server.
            Err(SignalingError::rejected(
                &camera.id,
                format!("session already exists: {}", message),
            ))
        } else if status.is_client_error() {
            Err(SignalingError::rejected(
                &camera.id,
                format!("HTTP {}: {}", status, message),
            ))
        } else {
            Err(SignalingError::network(
                &camera.id,
                format!("HTTP {}: {}", status, message),
            ))
        }
    }

    async fn send_candidate(&self, camera_id: &str, candidate: &IceCandidate) {
        let url = self.url("webrtc/ice", camera_id);

        match self
            .authorized(self.http.post(&url))
            .json(candidate)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(camera_id, "ICE candidate delivered");
            }
            Ok(response) => {
                warn!(camera_id, status = %response.status(), "ICE candidate rejected");
            }
            Err(e) => {
                warn!(camera_id, error = %e, "ICE candidate send failed");
            }
        }
    }

    async fn teardown(&self, camera_id: &str) {
        let url = self.url("webrtc", camera_id);

        match self.authorized(self.http.delete(&url)).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(camera_id, "Server-side session released");
            }
            Ok(response) => {
                warn!(camera_id, status = %response.status(), "Server-side teardown refused");
            }
            Err(e) => {
                warn!(camera_id, error = %e, "Server-side teardown failed");
            }
        }
    }
}
