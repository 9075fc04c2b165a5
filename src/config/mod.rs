//! Viewer configuration
//!
//! Serde-backed configuration for the connection manager: API and stream
//! endpoints, ICE servers, retry limits, and the image-poll fallback toggle.
//! Persistence and change notification live in [`store`].

pub mod store;

pub use store::{ConfigChange, ConfigStore};

use serde::{Deserialize, Serialize};

/// Top-level viewer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Auth/API collaborator endpoint
    #[serde(default)]
    pub api: ApiConfig,
    /// Media server signaling endpoint
    #[serde(default)]
    pub stream: StreamConfig,
    /// WebRTC transport settings
    #[serde(default)]
    pub webrtc: WebRtcConfig,
    /// Retry/reconnect policy settings
    #[serde(default)]
    pub retry: RetryConfig,
    /// Image-poll fallback settings
    #[serde(default)]
    pub fallback: FallbackConfig,
}

/// Auth/API server endpoint and optional login credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API server
    pub base_url: String,
    /// Login email (token is fetched at startup when both are set)
    #[serde(default)]
    pub email: Option<String>,
    /// Login password
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9095/api/v1".to_string(),
            email: None,
            password: None,
        }
    }
}

/// Media server signaling endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Base URL of the media server's signaling API
    pub base_url: String,
    /// Per-request deadline for signaling calls (seconds)
    pub request_timeout_secs: u64,
    /// Bounded wait for the first inbound media track after the answer
    /// is applied (seconds)
    pub first_track_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9095/api/v1".to_string(),
            request_timeout_secs: 10,
            first_track_timeout_secs: 10,
        }
    }
}

/// WebRTC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcConfig {
    /// Enable WebRTC live view; when false every tile uses image-poll
    pub enabled: bool,
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs (e.g., ["turn:turn.example.com:3478?transport=udp"])
    /// Multiple URLs allow fallback between UDP and TCP transports
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

/// Retry/reconnect policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum reconnect attempts on transient failures
    pub max_retries: u32,
    /// Fixed wait before the single conflict retry (ms)
    pub grace_period_ms: u64,
    /// First backoff delay for transient failures (ms); doubles per attempt
    pub initial_backoff_ms: u64,
    /// Backoff ceiling (ms)
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            grace_period_ms: 2000,
            initial_backoff_ms: 500,
            max_backoff_ms: 15_000,
        }
    }
}

/// Image-poll fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Offer the image-poll feed when WebRTC is exhausted or disabled
    pub enabled: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
